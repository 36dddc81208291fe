//! Typed event records decoded from the replay sub-streams.
//!
//! Every event in the tracker, message, and game streams is a
//! self-describing struct preceded by a gameloop delta and an event
//! id. The decoders here turn the generic [`Value`] trees into the
//! closed set of typed records the match reducer consumes; unknown
//! event ids are still decoded structurally and surfaced as
//! [`TrackerEventKind::Unknown`] so one new event type never breaks a
//! whole replay.
//!
//! Attribute events use a separate fixed little-endian layout and are
//! decoded with the raw [`crate::binary`] readers.

use crate::binary;
use crate::error::{ParserError, Result};
use crate::protocol::versioned::Value;

/// Gameloops per second of real time at the fixed "faster" game speed.
const LOOPS_PER_SECOND: f64 = 16.0 * 1.4;

/// Converts a gameloop count to seconds of game time.
#[must_use]
pub fn game_time(gameloop: u32) -> f64 {
    f64::from(gameloop) / LOOPS_PER_SECOND
}

/// Maps a map coordinate onto the 8-wide build grid.
///
/// Structures snap to a 10-unit lattice anchored at (20.5, 90) with y
/// growing downward; the resulting index identifies the cell a bunker
/// occupies, which in turn determines its flavor.
#[must_use]
pub fn grid_index(x: f64, y: f64) -> i64 {
    let col = ((x - 20.5) / 10.0).round() as i64;
    let row = ((90.0 - y) / 10.0).round() as i64;
    row * 8 + col
}

/// A recycling unit handle.
///
/// The game reuses tag indices; the recycle counter disambiguates
/// successive units behind the same index, so the pair is the only
/// safe identity for a unit across its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitTag {
    /// Slot index in the game's unit table.
    pub index: u32,
    /// Reuse counter for that slot.
    pub recycle: u32,
}

impl UnitTag {
    /// Creates a tag from its two halves.
    #[must_use]
    pub fn new(index: u32, recycle: u32) -> Self {
        UnitTag { index, recycle }
    }
}

/// Mineral score counters captured by a stats event.
///
/// All values are cumulative minerals except `minerals_current`, which
/// is the player's bank at the sample instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScoreSnapshot {
    /// Unspent minerals at the sample instant.
    pub minerals_current: i64,
    /// Minerals invested in live army units.
    pub minerals_used_army: i64,
    /// Minerals invested in live tech structures.
    pub minerals_used_technology: i64,
    /// Minerals of own tech lost.
    pub minerals_lost_technology: i64,
    /// Minerals of enemy army killed.
    pub minerals_killed_army: i64,
    /// Minerals of enemy economy killed.
    pub minerals_killed_economy: i64,
    /// Minerals of enemy tech killed.
    pub minerals_killed_technology: i64,
}

impl ScoreSnapshot {
    /// Total score: army plus economy kills.
    #[must_use]
    pub fn total_score(&self) -> i64 {
        self.minerals_killed_army + self.minerals_killed_economy
    }
}

/// The body of one tracker event.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEventKind {
    /// Periodic per-player score sample.
    PlayerStats {
        /// Player-namespace id the sample belongs to.
        player_id: i64,
        /// The score counters.
        stats: ScoreSnapshot,
    },
    /// A unit finished construction or spawned directly.
    UnitBorn {
        /// The unit's handle.
        tag: UnitTag,
        /// Catalog name of the unit type.
        unit_type: String,
        /// Controlling player id.
        control_player_id: i64,
        /// Upkeep-paying player id.
        upkeep_player_id: i64,
        /// Map x coordinate.
        x: i64,
        /// Map y coordinate.
        y: i64,
    },
    /// A unit died or was removed.
    UnitDied {
        /// The unit's handle.
        tag: UnitTag,
        /// Player credited with the kill, when any.
        killer_player_id: Option<i64>,
        /// Killing unit's handle, when recorded.
        killer_unit_tag: Option<UnitTag>,
        /// Map x coordinate of the death.
        x: i64,
        /// Map y coordinate of the death.
        y: i64,
    },
    /// A unit changed controlling player.
    UnitOwnerChange {
        /// The unit's handle.
        tag: UnitTag,
        /// New controlling player id.
        control_player_id: i64,
        /// New upkeep player id.
        upkeep_player_id: i64,
    },
    /// A unit morphed into another type.
    UnitTypeChange {
        /// The unit's handle.
        tag: UnitTag,
        /// New catalog name.
        unit_type: String,
    },
    /// A player finished researching an upgrade.
    Upgrade {
        /// Player-namespace id.
        player_id: i64,
        /// Catalog name of the upgrade.
        upgrade: String,
        /// Levels granted at once.
        count: i64,
    },
    /// A unit began construction.
    UnitInit {
        /// The unit's handle.
        tag: UnitTag,
        /// Catalog name of the unit type.
        unit_type: String,
        /// Controlling player id.
        control_player_id: i64,
        /// Upkeep-paying player id.
        upkeep_player_id: i64,
        /// Map x coordinate.
        x: i64,
        /// Map y coordinate.
        y: i64,
    },
    /// A unit under construction completed.
    UnitDone {
        /// The unit's handle.
        tag: UnitTag,
    },
    /// Declares the slot and user behind a player id.
    PlayerSetup {
        /// Player-namespace id being declared.
        player_id: i64,
        /// Participant type (1 = human, 2 = computer, 3 = neutral).
        setup_type: i64,
        /// User-namespace id, absent for computers.
        user_id: Option<i64>,
        /// Lobby slot id, absent for neutral.
        slot_id: Option<i64>,
    },
    /// Any event id outside the known set, kept structurally.
    Unknown {
        /// The stream's event id.
        event_id: i64,
    },
}

/// One tracker event with its absolute gameloop.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerEvent {
    /// Absolute gameloop, accumulated from stream deltas.
    pub gameloop: u32,
    /// The typed body.
    pub kind: TrackerEventKind,
}

impl TrackerEvent {
    /// Seconds of game time at which this event fired.
    #[must_use]
    pub fn game_time(&self) -> f64 {
        game_time(self.gameloop)
    }
}

/// Recipient scope of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRecipient {
    /// Visible to everyone.
    All,
    /// Visible to the sender's team.
    Allied,
    /// Observer or other restricted scope.
    Other,
}

impl ChatRecipient {
    fn from_raw(raw: i64) -> Self {
        match raw {
            0 => ChatRecipient::All,
            2 => ChatRecipient::Allied,
            _ => ChatRecipient::Other,
        }
    }
}

/// One message-stream event.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Absolute gameloop.
    pub gameloop: u32,
    /// Sending user id.
    pub user_id: i64,
    /// The body.
    pub kind: MessageEventKind,
}

/// The body of one message-stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEventKind {
    /// A chat line.
    Chat {
        /// Who can read it.
        recipient: ChatRecipient,
        /// The text.
        text: String,
    },
    /// Pings and other non-chat messages.
    Other {
        /// The stream's event id.
        event_id: i64,
    },
}

/// One game-stream event.
///
/// Only the per-user loading-time synchronization is extracted; its
/// payload doubles as a stable match identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    /// Absolute gameloop.
    pub gameloop: u32,
    /// Originating user id.
    pub user_id: i64,
    /// The body.
    pub kind: GameEventKind,
}

/// The body of one game-stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEventKind {
    /// Reports how long a client took to load.
    SyncLoadingTime {
        /// The client's load duration in gameloops.
        sync_time: i64,
    },
    /// Any other game event, skipped structurally.
    Other {
        /// The stream's event id.
        event_id: i64,
    },
}

/// One scoped attribute assignment from the attribute sub-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEntry {
    /// Attribute namespace.
    pub namespace: u32,
    /// Attribute id.
    pub attribute_id: u32,
    /// Lobby slot the value applies to.
    pub scope: u8,
    /// Decoded value string.
    pub value: String,
}

/// The decoded attribute sub-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEvents {
    /// Source byte from the stream header.
    pub source: u8,
    /// Map namespace from the stream header.
    pub map_namespace: u32,
    /// All scoped assignments in stream order.
    pub entries: Vec<AttributeEntry>,
}

/// Decodes the fixed-layout attribute sub-stream.
///
/// Layout: `source` u8, `map_namespace` u32, `count` u32, then per
/// entry `namespace` u32, `attribute_id` u32, `scope` u8 and a 4-byte
/// value stored reversed and null-padded.
///
/// # Errors
///
/// Returns `ParserError::UnexpectedEof` when the declared count runs
/// past the data.
pub fn decode_attribute_events(data: &[u8]) -> Result<AttributeEvents> {
    let mut offset = 0usize;
    let source = binary::read_u8(data, offset)?;
    offset += 1;
    let map_namespace = binary::read_u32_le(data, offset)?;
    offset += 4;
    let count = binary::read_u32_le(data, offset)?;
    offset += 4;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let namespace = binary::read_u32_le(data, offset)?;
        offset += 4;
        let attribute_id = binary::read_u32_le(data, offset)?;
        offset += 4;
        let scope = binary::read_u8(data, offset)?;
        offset += 1;
        let raw = binary::read_bytes(data, offset, 4)?;
        offset += 4;

        let value: String = raw
            .iter()
            .rev()
            .filter(|&&b| b != 0)
            .map(|&b| char::from(b))
            .collect();

        entries.push(AttributeEntry {
            namespace,
            attribute_id,
            scope,
            value,
        });
    }

    Ok(AttributeEvents {
        source,
        map_namespace,
        entries,
    })
}

// Tracker stream event ids.
pub(crate) const TRACKER_PLAYER_STATS: i64 = 0;
pub(crate) const TRACKER_UNIT_BORN: i64 = 1;
pub(crate) const TRACKER_UNIT_DIED: i64 = 2;
pub(crate) const TRACKER_UNIT_OWNER_CHANGE: i64 = 3;
pub(crate) const TRACKER_UNIT_TYPE_CHANGE: i64 = 4;
pub(crate) const TRACKER_UPGRADE: i64 = 5;
pub(crate) const TRACKER_UNIT_INIT: i64 = 6;
pub(crate) const TRACKER_UNIT_DONE: i64 = 7;
pub(crate) const TRACKER_UNIT_POSITIONS: i64 = 8;
pub(crate) const TRACKER_PLAYER_SETUP: i64 = 9;

// Message stream event ids.
pub(crate) const MESSAGE_CHAT: i64 = 0;

// Game stream event ids.
pub(crate) const GAME_SYNC_LOADING_TIME: i64 = 103;

// Field tags shared by the unit birth events.
const F_UNIT_TAG_INDEX: i64 = 0;
const F_UNIT_TAG_RECYCLE: i64 = 1;
const F_UNIT_TYPE_NAME: i64 = 2;
const F_UNIT_CONTROL_PLAYER: i64 = 3;
const F_UNIT_UPKEEP_PLAYER: i64 = 4;
const F_UNIT_X: i64 = 5;
const F_UNIT_Y: i64 = 6;

// Field tags of the death event.
const F_DIED_KILLER_PLAYER: i64 = 2;
const F_DIED_X: i64 = 3;
const F_DIED_Y: i64 = 4;
const F_DIED_KILLER_TAG_INDEX: i64 = 5;
const F_DIED_KILLER_TAG_RECYCLE: i64 = 6;

// Field tags of the stats sample.
const F_STATS_PLAYER_ID: i64 = 0;
const F_STATS_BODY: i64 = 1;
const F_SCORE_MINERALS_CURRENT: i64 = 0;
const F_SCORE_MINERALS_USED_ARMY: i64 = 7;
const F_SCORE_MINERALS_USED_TECHNOLOGY: i64 = 9;
const F_SCORE_MINERALS_LOST_TECHNOLOGY: i64 = 13;
const F_SCORE_MINERALS_KILLED_ARMY: i64 = 16;
const F_SCORE_MINERALS_KILLED_ECONOMY: i64 = 17;
const F_SCORE_MINERALS_KILLED_TECHNOLOGY: i64 = 18;

// Field tags of the remaining tracker bodies.
const F_SETUP_PLAYER_ID: i64 = 0;
const F_SETUP_TYPE: i64 = 1;
const F_SETUP_USER_ID: i64 = 2;
const F_SETUP_SLOT_ID: i64 = 3;
const F_UPGRADE_PLAYER_ID: i64 = 0;
const F_UPGRADE_TYPE_NAME: i64 = 1;
const F_UPGRADE_COUNT: i64 = 2;
const F_OWNER_CONTROL_PLAYER: i64 = 2;
const F_OWNER_UPKEEP_PLAYER: i64 = 3;

// Field tags of the message and game bodies.
const F_CHAT_RECIPIENT: i64 = 0;
const F_CHAT_STRING: i64 = 1;
const F_SYNC_TIME: i64 = 0;

fn require_int(body: &Value, tag: i64, offset: usize, what: &str) -> Result<i64> {
    body.field(tag)
        .and_then(Value::as_int)
        .ok_or_else(|| ParserError::decode(offset, format!("missing {what} field {tag}")))
}

fn require_str(body: &Value, tag: i64, offset: usize, what: &str) -> Result<String> {
    body.field(tag)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ParserError::decode(offset, format!("missing {what} field {tag}")))
}

fn optional_int(body: &Value, tag: i64) -> Option<i64> {
    body.field(tag).and_then(Value::as_int)
}

fn unit_tag(body: &Value, offset: usize, what: &str) -> Result<UnitTag> {
    let index = require_int(body, F_UNIT_TAG_INDEX, offset, what)?;
    let recycle = require_int(body, F_UNIT_TAG_RECYCLE, offset, what)?;
    Ok(UnitTag::new(index as u32, recycle as u32))
}

fn born_body(body: &Value, offset: usize, what: &str) -> Result<(UnitTag, String, i64, i64, i64, i64)> {
    Ok((
        unit_tag(body, offset, what)?,
        require_str(body, F_UNIT_TYPE_NAME, offset, what)?,
        require_int(body, F_UNIT_CONTROL_PLAYER, offset, what)?,
        require_int(body, F_UNIT_UPKEEP_PLAYER, offset, what)?,
        require_int(body, F_UNIT_X, offset, what)?,
        require_int(body, F_UNIT_Y, offset, what)?,
    ))
}

/// Turns a decoded tracker body into its typed kind.
pub(crate) fn tracker_kind(event_id: i64, body: &Value, offset: usize) -> Result<TrackerEventKind> {
    match event_id {
        TRACKER_PLAYER_STATS => {
            let player_id = require_int(body, F_STATS_PLAYER_ID, offset, "stats")?;
            let stats_body = body
                .field(F_STATS_BODY)
                .ok_or_else(|| ParserError::decode(offset, "missing stats body"))?;
            let stats = ScoreSnapshot {
                minerals_current: require_int(stats_body, F_SCORE_MINERALS_CURRENT, offset, "score")?,
                minerals_used_army: optional_int(stats_body, F_SCORE_MINERALS_USED_ARMY)
                    .unwrap_or_default(),
                minerals_used_technology: optional_int(stats_body, F_SCORE_MINERALS_USED_TECHNOLOGY)
                    .unwrap_or_default(),
                minerals_lost_technology: optional_int(stats_body, F_SCORE_MINERALS_LOST_TECHNOLOGY)
                    .unwrap_or_default(),
                minerals_killed_army: optional_int(stats_body, F_SCORE_MINERALS_KILLED_ARMY)
                    .unwrap_or_default(),
                minerals_killed_economy: optional_int(stats_body, F_SCORE_MINERALS_KILLED_ECONOMY)
                    .unwrap_or_default(),
                minerals_killed_technology: optional_int(
                    stats_body,
                    F_SCORE_MINERALS_KILLED_TECHNOLOGY,
                )
                .unwrap_or_default(),
            };
            Ok(TrackerEventKind::PlayerStats { player_id, stats })
        }
        TRACKER_UNIT_BORN => {
            let (tag, unit_type, control, upkeep, x, y) = born_body(body, offset, "unit born")?;
            Ok(TrackerEventKind::UnitBorn {
                tag,
                unit_type,
                control_player_id: control,
                upkeep_player_id: upkeep,
                x,
                y,
            })
        }
        TRACKER_UNIT_DIED => {
            let tag = unit_tag(body, offset, "unit died")?;
            let killer_player_id = optional_int(body, F_DIED_KILLER_PLAYER);
            let killer_unit_tag = match (
                optional_int(body, F_DIED_KILLER_TAG_INDEX),
                optional_int(body, F_DIED_KILLER_TAG_RECYCLE),
            ) {
                (Some(index), Some(recycle)) => Some(UnitTag::new(index as u32, recycle as u32)),
                _ => None,
            };
            Ok(TrackerEventKind::UnitDied {
                tag,
                killer_player_id,
                killer_unit_tag,
                x: require_int(body, F_DIED_X, offset, "unit died")?,
                y: require_int(body, F_DIED_Y, offset, "unit died")?,
            })
        }
        TRACKER_UNIT_OWNER_CHANGE => Ok(TrackerEventKind::UnitOwnerChange {
            tag: unit_tag(body, offset, "owner change")?,
            control_player_id: require_int(body, F_OWNER_CONTROL_PLAYER, offset, "owner change")?,
            upkeep_player_id: require_int(body, F_OWNER_UPKEEP_PLAYER, offset, "owner change")?,
        }),
        TRACKER_UNIT_TYPE_CHANGE => Ok(TrackerEventKind::UnitTypeChange {
            tag: unit_tag(body, offset, "type change")?,
            unit_type: require_str(body, F_UNIT_TYPE_NAME, offset, "type change")?,
        }),
        TRACKER_UPGRADE => Ok(TrackerEventKind::Upgrade {
            player_id: require_int(body, F_UPGRADE_PLAYER_ID, offset, "upgrade")?,
            upgrade: require_str(body, F_UPGRADE_TYPE_NAME, offset, "upgrade")?,
            count: require_int(body, F_UPGRADE_COUNT, offset, "upgrade")?,
        }),
        TRACKER_UNIT_INIT => {
            let (tag, unit_type, control, upkeep, x, y) = born_body(body, offset, "unit init")?;
            Ok(TrackerEventKind::UnitInit {
                tag,
                unit_type,
                control_player_id: control,
                upkeep_player_id: upkeep,
                x,
                y,
            })
        }
        TRACKER_UNIT_DONE => Ok(TrackerEventKind::UnitDone {
            tag: unit_tag(body, offset, "unit done")?,
        }),
        TRACKER_PLAYER_SETUP => Ok(TrackerEventKind::PlayerSetup {
            player_id: require_int(body, F_SETUP_PLAYER_ID, offset, "player setup")?,
            setup_type: require_int(body, F_SETUP_TYPE, offset, "player setup")?,
            user_id: optional_int(body, F_SETUP_USER_ID),
            slot_id: optional_int(body, F_SETUP_SLOT_ID),
        }),
        TRACKER_UNIT_POSITIONS => Ok(TrackerEventKind::Unknown { event_id }),
        other => Ok(TrackerEventKind::Unknown { event_id: other }),
    }
}

/// Turns a decoded message body into its typed kind.
pub(crate) fn message_kind(event_id: i64, body: &Value, offset: usize) -> Result<MessageEventKind> {
    match event_id {
        MESSAGE_CHAT => Ok(MessageEventKind::Chat {
            recipient: ChatRecipient::from_raw(require_int(
                body,
                F_CHAT_RECIPIENT,
                offset,
                "chat",
            )?),
            text: require_str(body, F_CHAT_STRING, offset, "chat")?,
        }),
        other => Ok(MessageEventKind::Other { event_id: other }),
    }
}

/// Turns a decoded game-stream body into its typed kind.
pub(crate) fn game_kind(event_id: i64, body: &Value, offset: usize) -> Result<GameEventKind> {
    match event_id {
        GAME_SYNC_LOADING_TIME => Ok(GameEventKind::SyncLoadingTime {
            sync_time: require_int(body, F_SYNC_TIME, offset, "sync loading time")?,
        }),
        other => Ok(GameEventKind::Other { event_id: other }),
    }
}
