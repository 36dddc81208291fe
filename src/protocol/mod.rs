//! Versioned protocol: build registry and sub-stream decoders.
//!
//! Every replay records the `base_build` of the client that wrote it.
//! A [`Protocol`] bundles the schema for one such build; the registry
//! resolves a build number to the nearest known protocol so replays
//! from unknown client patches still parse (schemas drift rarely, so
//! a neighboring build usually reads them cleanly).
//!
//! # Stream framing
//!
//! | Stream | Record layout |
//! |--------|---------------|
//! | tracker | delta vint, event id vint, body struct |
//! | message | delta vint, user id vint, event id vint, body struct |
//! | game | delta vint, user id vint, event id vint, body struct |
//!
//! All values are tagged per [`versioned`]; deltas accumulate into an
//! absolute gameloop per stream.
//!
//! The replay header travels in the archive's user-data block and is
//! decodable without a protocol, since picking a protocol requires the
//! `base_build` it carries.

pub mod events;
pub mod versioned;

use tracing::debug;

use crate::error::{ParserError, Result};
use events::{GameEvent, MessageEvent, TrackerEvent};
use versioned::{Value, VersionedDecoder};

/// Builds with verified schemas, ascending.
pub const KNOWN_BUILDS: &[u32] = &[75689, 76114, 77379, 78285, 80188, 80949, 81433];

// Replay header field tags.
const F_HEADER_VERSION: i64 = 1;
const F_HEADER_ELAPSED_LOOPS: i64 = 3;
const F_VERSION_MAJOR: i64 = 1;
const F_VERSION_MINOR: i64 = 2;
const F_VERSION_REVISION: i64 = 3;
const F_VERSION_BUILD: i64 = 4;
const F_VERSION_BASE_BUILD: i64 = 5;

// Details field tags.
const F_DETAILS_PLAYER_LIST: i64 = 0;
const F_DETAILS_TITLE: i64 = 1;
const F_PLAYER_NAME: i64 = 0;
const F_PLAYER_TOON: i64 = 1;
const F_PLAYER_COLOR: i64 = 3;
const F_PLAYER_TEAM_ID: i64 = 5;
const F_PLAYER_OBSERVE: i64 = 7;
const F_PLAYER_RESULT: i64 = 8;
const F_PLAYER_SLOT_ID: i64 = 9;
const F_TOON_REGION: i64 = 0;
const F_TOON_REALM: i64 = 2;
const F_TOON_ID: i64 = 3;
const F_COLOR_R: i64 = 1;
const F_COLOR_G: i64 = 2;
const F_COLOR_B: i64 = 3;

// Init-data field tags.
const F_INIT_SYNC_LOBBY_STATE: i64 = 0;
const F_SYNC_LOBBY_STATE: i64 = 3;
const F_LOBBY_SLOTS: i64 = 7;
const F_SLOT_CONTROL: i64 = 0;
const F_SLOT_USER_ID: i64 = 1;
const F_SLOT_TEAM_ID: i64 = 2;
const F_SLOT_OBSERVE: i64 = 6;
const F_SLOT_WORKING_SET: i64 = 18;

/// Match result recorded per player in the details sub-stream.
pub const RESULT_WIN: i64 = 1;
/// Loss marker in the details result field.
pub const RESULT_LOSS: i64 = 2;

/// The decoded replay header from the archive user-data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayHeader {
    /// Client version as (major, minor, revision, build).
    pub version: (i64, i64, i64, i64),
    /// Protocol build that wrote the replay.
    pub base_build: u32,
    /// Total gameloops in the recording.
    pub elapsed_game_loops: u32,
}

/// Decodes the replay header from user-data content.
///
/// Protocol-independent: this is how the `base_build` needed for
/// protocol selection is obtained in the first place.
///
/// # Errors
///
/// Returns `ParserError::DecodeError` when the header structure or
/// any required field is missing.
pub fn decode_replay_header(content: &[u8]) -> Result<ReplayHeader> {
    let mut decoder = VersionedDecoder::new(content);
    let root = decoder.decode_value()?;

    let version = root
        .field(F_HEADER_VERSION)
        .ok_or_else(|| ParserError::decode(0, "replay header missing version"))?;
    let field = |tag: i64, what: &str| -> Result<i64> {
        version
            .field(tag)
            .and_then(Value::as_int)
            .ok_or_else(|| ParserError::decode(0, format!("replay header missing {what}")))
    };

    let base_build = field(F_VERSION_BASE_BUILD, "base build")?;
    let elapsed = root
        .field(F_HEADER_ELAPSED_LOOPS)
        .and_then(Value::as_int)
        .unwrap_or_default();

    Ok(ReplayHeader {
        version: (
            field(F_VERSION_MAJOR, "major version")?,
            field(F_VERSION_MINOR, "minor version")?,
            field(F_VERSION_REVISION, "revision")?,
            field(F_VERSION_BUILD, "build")?,
        ),
        base_build: u32::try_from(base_build)
            .map_err(|_| ParserError::decode(0, "base build out of range"))?,
        elapsed_game_loops: u32::try_from(elapsed).unwrap_or_default(),
    })
}

/// Player color from the lobby, 8 bits per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PlayerColor {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

/// One entry of the details player list.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailsPlayer {
    /// Display name, possibly prefixed with a clan tag.
    pub name: String,
    /// Stable battle.net profile id, `{region}-S2-{realm}-{id}`.
    pub profile_id: String,
    /// Lobby color.
    pub color: PlayerColor,
    /// Team the lobby assigned.
    pub team_id: i64,
    /// Observer flag.
    pub observe: i64,
    /// Recorded result, [`RESULT_WIN`] or [`RESULT_LOSS`] when present.
    pub result: Option<i64>,
    /// Working-set slot linking this entry to the lobby slot list.
    pub working_set_slot_id: Option<i64>,
}

/// The decoded details sub-stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Details {
    /// Map title, used to recognize the game mode.
    pub title: String,
    /// Players in list order.
    pub players: Vec<DetailsPlayer>,
}

/// One lobby slot from init-data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbySlot {
    /// Control type (2 = human, 3 = computer).
    pub control: i64,
    /// User id occupying the slot, absent when empty or computer.
    pub user_id: Option<i64>,
    /// Team the slot belongs to.
    pub team_id: i64,
    /// Observer flag.
    pub observe: i64,
    /// Index into the details player list.
    pub working_set_slot_id: Option<i64>,
}

/// The decoded init-data sub-stream, reduced to its slot list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    /// Lobby slots in slot-id order.
    pub slots: Vec<LobbySlot>,
}

/// Schema handle for one protocol build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    base_build: u32,
}

impl Protocol {
    /// Returns the protocol for an exactly known build.
    #[must_use]
    pub fn exact(base_build: u32) -> Option<Protocol> {
        KNOWN_BUILDS
            .contains(&base_build)
            .then_some(Protocol { base_build })
    }

    /// Returns the nearest known builds below and above the given one.
    ///
    /// Either side is `None` when the build falls outside the known
    /// range on that side.
    #[must_use]
    pub fn closest(base_build: u32) -> (Option<u32>, Option<u32>) {
        let lower = KNOWN_BUILDS
            .iter()
            .copied()
            .filter(|&b| b < base_build)
            .max();
        let upper = KNOWN_BUILDS
            .iter()
            .copied()
            .filter(|&b| b > base_build)
            .min();
        (lower, upper)
    }

    /// Picks the protocol to open a replay with.
    ///
    /// Exact match first, then the nearest lower build, then the
    /// nearest higher; the caller may later retry with the other
    /// bracket on a decode failure.
    #[must_use]
    pub fn select(base_build: u32) -> Option<Protocol> {
        if let Some(protocol) = Protocol::exact(base_build) {
            return Some(protocol);
        }
        let (lower, upper) = Protocol::closest(base_build);
        let chosen = lower.or(upper)?;
        debug!(
            replay_build = base_build,
            chosen_build = chosen,
            "substituting nearest known protocol"
        );
        Some(Protocol { base_build: chosen })
    }

    /// The build this protocol's schema belongs to.
    #[must_use]
    pub fn base_build(&self) -> u32 {
        self.base_build
    }

    /// Decodes the details sub-stream.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::DecodeError` when the structure does not
    /// match this build's schema.
    pub fn decode_details(&self, data: &[u8]) -> Result<Details> {
        let mut decoder = VersionedDecoder::new(data);
        let root = decoder.decode_value()?;

        let title = root
            .field(F_DETAILS_TITLE)
            .and_then(Value::as_str)
            .ok_or_else(|| ParserError::decode(0, "details missing title"))?
            .to_owned();

        let mut players = Vec::new();
        if let Some(list) = root.field(F_DETAILS_PLAYER_LIST).and_then(Value::as_array) {
            for entry in list {
                players.push(Self::decode_details_player(entry)?);
            }
        }

        Ok(Details { title, players })
    }

    fn decode_details_player(entry: &Value) -> Result<DetailsPlayer> {
        let name = entry
            .field(F_PLAYER_NAME)
            .and_then(Value::as_str)
            .ok_or_else(|| ParserError::decode(0, "details player missing name"))?
            .to_owned();

        let toon = entry
            .field(F_PLAYER_TOON)
            .ok_or_else(|| ParserError::decode(0, "details player missing toon"))?;
        let region = toon.field(F_TOON_REGION).and_then(Value::as_int).unwrap_or_default();
        let realm = toon.field(F_TOON_REALM).and_then(Value::as_int).unwrap_or_default();
        let id = toon.field(F_TOON_ID).and_then(Value::as_int).unwrap_or_default();
        let profile_id = format!("{region}-S2-{realm}-{id}");

        let color = entry
            .field(F_PLAYER_COLOR)
            .map(|c| PlayerColor {
                r: c.field(F_COLOR_R).and_then(Value::as_int).unwrap_or_default() as u8,
                g: c.field(F_COLOR_G).and_then(Value::as_int).unwrap_or_default() as u8,
                b: c.field(F_COLOR_B).and_then(Value::as_int).unwrap_or_default() as u8,
            })
            .unwrap_or_default();

        Ok(DetailsPlayer {
            name,
            profile_id,
            color,
            team_id: entry
                .field(F_PLAYER_TEAM_ID)
                .and_then(Value::as_int)
                .unwrap_or_default(),
            observe: entry
                .field(F_PLAYER_OBSERVE)
                .and_then(Value::as_int)
                .unwrap_or_default(),
            result: entry
                .field(F_PLAYER_RESULT)
                .and_then(Value::as_int)
                .filter(|&r| r != 0),
            working_set_slot_id: entry.field(F_PLAYER_SLOT_ID).and_then(Value::as_int),
        })
    }

    /// Decodes the init-data sub-stream down to its lobby slot list.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::DecodeError` when the lobby state or slot
    /// list is missing.
    pub fn decode_init_data(&self, data: &[u8]) -> Result<InitData> {
        let mut decoder = VersionedDecoder::new(data);
        let root = decoder.decode_value()?;

        let slots_value = root
            .field(F_INIT_SYNC_LOBBY_STATE)
            .and_then(|sync| sync.field(F_SYNC_LOBBY_STATE))
            .and_then(|lobby| lobby.field(F_LOBBY_SLOTS))
            .and_then(Value::as_array)
            .ok_or_else(|| ParserError::decode(0, "init data missing lobby slots"))?;

        let mut slots = Vec::with_capacity(slots_value.len());
        for slot in slots_value {
            slots.push(LobbySlot {
                control: slot
                    .field(F_SLOT_CONTROL)
                    .and_then(Value::as_int)
                    .unwrap_or_default(),
                user_id: slot.field(F_SLOT_USER_ID).and_then(Value::as_int),
                team_id: slot
                    .field(F_SLOT_TEAM_ID)
                    .and_then(Value::as_int)
                    .unwrap_or_default(),
                observe: slot
                    .field(F_SLOT_OBSERVE)
                    .and_then(Value::as_int)
                    .unwrap_or_default(),
                working_set_slot_id: slot.field(F_SLOT_WORKING_SET).and_then(Value::as_int),
            });
        }

        Ok(InitData { slots })
    }

    /// Returns a lazy iterator over the tracker event stream.
    #[must_use]
    pub fn tracker_events<'a>(&self, data: &'a [u8]) -> TrackerEventStream<'a> {
        TrackerEventStream {
            data,
            cursor: TrackerCursor::default(),
        }
    }

    /// Decodes the next tracker event at the cursor, advancing it.
    ///
    /// Returns `None` once the stream is exhausted or after the first
    /// malformed record; the cursor remembers the failure so a caller
    /// that owns its buffer can resume polling safely.
    pub fn next_tracker_event(
        &self,
        data: &[u8],
        cursor: &mut TrackerCursor,
    ) -> Option<Result<TrackerEvent>> {
        next_tracker_record(data, cursor)
    }

    /// Decodes the whole message stream, keeping chat lines typed.
    ///
    /// # Errors
    ///
    /// Returns any decode error from the underlying stream.
    pub fn message_events(&self, data: &[u8]) -> Result<Vec<MessageEvent>> {
        let mut decoder = VersionedDecoder::new(data);
        let mut gameloop = 0u32;
        let mut out = Vec::new();
        while !decoder.is_exhausted() {
            let (delta, user_id, event_id, body, offset) = decode_user_record(&mut decoder)?;
            gameloop = gameloop.saturating_add(delta);
            out.push(MessageEvent {
                gameloop,
                user_id,
                kind: events::message_kind(event_id, &body, offset)?,
            });
        }
        Ok(out)
    }

    /// Decodes the game stream, keeping loading-time events typed.
    ///
    /// # Errors
    ///
    /// Returns any decode error from the underlying stream.
    pub fn game_events(&self, data: &[u8]) -> Result<Vec<GameEvent>> {
        let mut decoder = VersionedDecoder::new(data);
        let mut gameloop = 0u32;
        let mut out = Vec::new();
        while !decoder.is_exhausted() {
            let (delta, user_id, event_id, body, offset) = decode_user_record(&mut decoder)?;
            gameloop = gameloop.saturating_add(delta);
            out.push(GameEvent {
                gameloop,
                user_id,
                kind: events::game_kind(event_id, &body, offset)?,
            });
        }
        Ok(out)
    }
}

fn decode_tagged_int(decoder: &mut VersionedDecoder<'_>, what: &str) -> Result<i64> {
    let offset = decoder.offset();
    decoder
        .decode_value()?
        .as_int()
        .ok_or_else(|| ParserError::decode(offset, format!("{what} is not an integer")))
}

/// Decodes the shared `delta, user id, event id, body` record framing.
fn decode_user_record(
    decoder: &mut VersionedDecoder<'_>,
) -> Result<(u32, i64, i64, Value, usize)> {
    let offset = decoder.offset();
    let delta = decode_tagged_int(decoder, "event delta")?;
    let user_id = decode_tagged_int(decoder, "event user id")?;
    let event_id = decode_tagged_int(decoder, "event id")?;
    let body = decoder.decode_value()?;
    let delta = u32::try_from(delta)
        .map_err(|_| ParserError::decode(offset, "negative event delta"))?;
    Ok((delta, user_id, event_id, body, offset))
}

fn next_tracker_record(data: &[u8], cursor: &mut TrackerCursor) -> Option<Result<TrackerEvent>> {
    if cursor.failed || cursor.offset >= data.len() {
        return None;
    }
    let item = decode_tracker_record(data, cursor);
    if item.is_err() {
        cursor.failed = true;
    }
    Some(item)
}

fn decode_tracker_record(data: &[u8], cursor: &mut TrackerCursor) -> Result<TrackerEvent> {
    let mut decoder = VersionedDecoder::new(data);
    decoder.seek(cursor.offset);
    let offset = cursor.offset;

    let delta = decode_tagged_int(&mut decoder, "tracker delta")?;
    let event_id = decode_tagged_int(&mut decoder, "tracker event id")?;
    let body = decoder.decode_value()?;

    let delta =
        u32::try_from(delta).map_err(|_| ParserError::decode(offset, "negative tracker delta"))?;
    cursor.gameloop = cursor.gameloop.saturating_add(delta);
    cursor.offset = decoder.offset();

    Ok(TrackerEvent {
        gameloop: cursor.gameloop,
        kind: events::tracker_kind(event_id, &body, offset)?,
    })
}

/// Decode position within a tracker event stream.
///
/// Tracker records carry gameloop *deltas*, so the cursor keeps the
/// accumulated gameloop alongside the byte offset. `failed` latches at
/// the first malformed record: a truncated stream surfaces exactly one
/// error after its good prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerCursor {
    /// Byte offset of the next record.
    pub offset: usize,
    /// Gameloop accumulated so far.
    pub gameloop: u32,
    /// Set after the first decode error.
    pub failed: bool,
}

/// Lazy iterator over tracker events, borrowing the stream bytes.
#[derive(Debug)]
pub struct TrackerEventStream<'a> {
    data: &'a [u8],
    cursor: TrackerCursor,
}

impl Iterator for TrackerEventStream<'_> {
    type Item = Result<TrackerEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        next_tracker_record(self.data, &mut self.cursor)
    }
}
