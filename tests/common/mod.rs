//! Shared fixture builders for integration tests.
//!
//! Builds complete synthetic `.SC2Replay` archives from scratch: the
//! encoded sub-streams, the encrypted lookup tables, and the compound
//! container, so tests exercise the same path a real replay takes.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use zc_parser::archive::crypt::{hash_string, HashType};
use zc_parser::archive::{self, encrypt, table_words_to_bytes};
use zc_parser::protocol::versioned::{encode_value, Value};

const FLAG_EXISTS: u32 = 0x8000_0000;
const FLAG_COMPRESS: u32 = 0x0000_0200;
const FLAG_SINGLE_UNIT: u32 = 0x0100_0000;
const COMPRESSION_ZLIB: u8 = 0x02;
const HASH_SLOTS: usize = 16;

/// One participant of a synthetic match.
#[derive(Debug, Clone)]
pub struct FixturePlayer {
    /// Player-namespace id carried by unit events.
    pub player_id: i64,
    /// User-namespace id carried by message events.
    pub user_id: i64,
    /// Working-set slot linking details to the lobby.
    pub slot_id: i64,
    /// Display name.
    pub name: String,
    /// Spawn position 0-11.
    pub position: i64,
}

/// The default 2v2: positions 0,1 (team 0) vs 2,3 (team 1).
#[must_use]
pub fn players_2v2() -> Vec<FixturePlayer> {
    (0..4)
        .map(|i| FixturePlayer {
            player_id: i + 1,
            user_id: i + 10,
            slot_id: i,
            name: format!("Player{}", i + 1),
            position: i,
        })
        .collect()
}

/// Map coordinates of the starting bunker for a spawn position.
#[must_use]
pub fn start_coordinates(position: i64) -> (i64, i64) {
    // spawn position -> fixed build-grid square
    let index = match position {
        0 => 8,
        1 => 1,
        2 => 6,
        3 => 15,
        4 => 55,
        5 => 62,
        6 => 57,
        7 => 48,
        8 => 9,
        9 => 14,
        10 => 54,
        11 => 49,
        _ => panic!("no spawn at position {position}"),
    };
    (20 + 10 * (index % 8), 90 - 10 * (index / 8))
}

// ============================================================================
// Tracker / message / game stream encoders
// ============================================================================

/// Appends one tracker record: delta, event id, body.
pub fn push_tracker(stream: &mut Vec<u8>, delta: i64, event_id: i64, body: Value) {
    stream.extend(encode_value(&Value::Int(delta)));
    stream.extend(encode_value(&Value::Int(event_id)));
    stream.extend(encode_value(&body));
}

/// Appends one user record: delta, user id, event id, body.
pub fn push_user_record(stream: &mut Vec<u8>, delta: i64, user_id: i64, event_id: i64, body: Value) {
    stream.extend(encode_value(&Value::Int(delta)));
    stream.extend(encode_value(&Value::Int(user_id)));
    stream.extend(encode_value(&Value::Int(event_id)));
    stream.extend(encode_value(&body));
}

/// Player-setup body (event id 9).
#[must_use]
pub fn setup_body(player_id: i64, user_id: i64, slot_id: i64) -> Value {
    Value::Struct(vec![
        (0, Value::Int(player_id)),
        (1, Value::Int(1)),
        (2, Value::Optional(Some(Box::new(Value::Int(user_id))))),
        (3, Value::Optional(Some(Box::new(Value::Int(slot_id))))),
    ])
}

/// Unit-born / unit-init body (event ids 1 and 6).
#[must_use]
pub fn born_body(tag_index: i64, unit_type: &str, player_id: i64, x: i64, y: i64) -> Value {
    Value::Struct(vec![
        (0, Value::Int(tag_index)),
        (1, Value::Int(1)),
        (2, Value::Blob(unit_type.as_bytes().to_vec())),
        (3, Value::Int(player_id)),
        (4, Value::Int(player_id)),
        (5, Value::Int(x)),
        (6, Value::Int(y)),
    ])
}

/// Unit-died body (event id 2); omit `killer` for an unattributed death.
#[must_use]
pub fn died_body(tag_index: i64, killer: Option<i64>, x: i64, y: i64) -> Value {
    let mut fields = vec![(0, Value::Int(tag_index)), (1, Value::Int(1))];
    if let Some(killer) = killer {
        fields.push((2, Value::Optional(Some(Box::new(Value::Int(killer))))));
    }
    fields.push((3, Value::Int(x)));
    fields.push((4, Value::Int(y)));
    Value::Struct(fields)
}

/// Unit-owner-change body (event id 3).
#[must_use]
pub fn transfer_body(tag_index: i64, new_owner: i64) -> Value {
    Value::Struct(vec![
        (0, Value::Int(tag_index)),
        (1, Value::Int(1)),
        (2, Value::Int(new_owner)),
        (3, Value::Int(new_owner)),
    ])
}

/// Player-stats body (event id 0).
#[must_use]
pub fn stats_body(player_id: i64, minerals_current: i64, killed_army: i64) -> Value {
    Value::Struct(vec![
        (0, Value::Int(player_id)),
        (
            1,
            Value::Struct(vec![
                (0, Value::Int(minerals_current)),
                (7, Value::Int(0)),
                (9, Value::Int(0)),
                (13, Value::Int(0)),
                (16, Value::Int(killed_army)),
                (17, Value::Int(0)),
                (18, Value::Int(0)),
            ]),
        ),
    ])
}

/// Chat body (message event id 0).
#[must_use]
pub fn chat_body(recipient: i64, text: &str) -> Value {
    Value::Struct(vec![
        (0, Value::Int(recipient)),
        (1, Value::Blob(text.as_bytes().to_vec())),
    ])
}

/// Appends the pre-game prefix every match opens with: one setup per
/// player, then the loop-zero starting bunkers (tag = 100 + player id).
pub fn push_match_prefix(stream: &mut Vec<u8>, players: &[FixturePlayer]) {
    for p in players {
        push_tracker(stream, 0, 9, setup_body(p.player_id, p.user_id, p.slot_id));
    }
    for p in players {
        let (x, y) = start_coordinates(p.position);
        push_tracker(
            stream,
            0,
            1,
            born_body(100 + p.player_id, "Bunker", p.player_id, x, y),
        );
    }
}

// ============================================================================
// Sub-stream payloads
// ============================================================================

/// Encoded replay header for the user-data block.
#[must_use]
pub fn header_content(base_build: i64, elapsed_game_loops: i64) -> Vec<u8> {
    encode_value(&Value::Struct(vec![
        (
            1,
            Value::Struct(vec![
                (1, Value::Int(4)),
                (2, Value::Int(11)),
                (3, Value::Int(3)),
                (4, Value::Int(base_build)),
                (5, Value::Int(base_build)),
            ]),
        ),
        (3, Value::Int(elapsed_game_loops)),
    ]))
}

/// Encoded details sub-stream.
#[must_use]
pub fn details_entry(title: &str, players: &[FixturePlayer]) -> Vec<u8> {
    let list = players
        .iter()
        .map(|p| {
            Value::Struct(vec![
                (0, Value::Blob(p.name.as_bytes().to_vec())),
                (
                    1,
                    Value::Struct(vec![
                        (0, Value::Int(1)),
                        (2, Value::Int(1)),
                        (3, Value::Int(p.player_id)),
                    ]),
                ),
                (
                    3,
                    Value::Struct(vec![
                        (1, Value::Int(60)),
                        (2, Value::Int(120)),
                        (3, Value::Int(180)),
                    ]),
                ),
                (5, Value::Int(0)),
                (7, Value::Int(0)),
                (8, Value::Int(if p.position >= 2 { 1 } else { 2 })),
                (9, Value::Optional(Some(Box::new(Value::Int(p.slot_id))))),
            ])
        })
        .collect();
    encode_value(&Value::Struct(vec![
        (0, Value::Array(list)),
        (1, Value::Blob(title.as_bytes().to_vec())),
    ]))
}

/// Encoded init-data sub-stream.
#[must_use]
pub fn init_data_entry(players: &[FixturePlayer]) -> Vec<u8> {
    let slots = players
        .iter()
        .map(|p| {
            Value::Struct(vec![
                (0, Value::Int(2)),
                (1, Value::Optional(Some(Box::new(Value::Int(p.user_id))))),
                (2, Value::Int(0)),
                (6, Value::Int(0)),
                (18, Value::Optional(Some(Box::new(Value::Int(p.slot_id))))),
            ])
        })
        .collect();
    encode_value(&Value::Struct(vec![(
        0,
        Value::Struct(vec![(
            3,
            Value::Struct(vec![(7, Value::Array(slots))]),
        )]),
    )]))
}

/// Encoded game event stream with one sync-loading-time record.
#[must_use]
pub fn game_events_entry(sync_time: i64) -> Vec<u8> {
    let mut stream = Vec::new();
    push_user_record(
        &mut stream,
        0,
        16,
        103,
        Value::Struct(vec![(0, Value::Int(sync_time))]),
    );
    stream
}

/// Metadata JSON naming the given base build.
#[must_use]
pub fn metadata_entry(title: &str, base_build: u32) -> Vec<u8> {
    format!(r#"{{"Title": "{title}", "BaseBuild": "Base{base_build}", "GameVersion": "4.11.3.{base_build}"}}"#)
        .into_bytes()
}

/// Minimal attribute-events entry: header with zero attributes.
#[must_use]
pub fn attributes_entry() -> Vec<u8> {
    let mut out = vec![0u8];
    out.extend_from_slice(&999u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

// ============================================================================
// Archive builder
// ============================================================================

/// Builds a complete compound archive from named entries.
///
/// Every entry is stored zlib-compressed as a single unit. The hash
/// table uses real name hashing with linear probing, so lookup in the
/// reader follows the same path as for a game-written archive.
#[must_use]
pub fn build_archive(user_content: &[u8], entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let header_offset = 16 + user_content.len();

    let mut archive = Vec::new();
    archive.extend_from_slice(archive::USER_DATA_MAGIC);
    archive.extend_from_slice(&1024u32.to_le_bytes());
    archive.extend_from_slice(&(header_offset as u32).to_le_bytes());
    archive.extend_from_slice(&(user_content.len() as u32).to_le_bytes());
    archive.extend_from_slice(user_content);

    // File data sits right after the 32-byte archive header.
    let mut file_data = Vec::new();
    let mut block_words = Vec::new();
    let mut placed: Vec<(usize, u32)> = vec![(usize::MAX, 0); HASH_SLOTS]; // (entry idx, block)

    for (block_index, (name, contents)) in entries.iter().enumerate() {
        let mut compressed = vec![COMPRESSION_ZLIB];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents).unwrap();
        compressed.extend_from_slice(&encoder.finish().unwrap());

        let offset = 32 + file_data.len();
        block_words.extend_from_slice(&[
            offset as u32,
            compressed.len() as u32,
            contents.len() as u32,
            FLAG_EXISTS | FLAG_COMPRESS | FLAG_SINGLE_UNIT,
        ]);
        file_data.extend_from_slice(&compressed);

        let start = hash_string(name, HashType::TableOffset) as usize & (HASH_SLOTS - 1);
        let slot = (0..HASH_SLOTS)
            .map(|probe| (start + probe) % HASH_SLOTS)
            .find(|&slot| placed[slot].0 == usize::MAX)
            .unwrap();
        placed[slot] = (block_index, block_index as u32);
    }

    let mut hash_words = Vec::new();
    for &(entry_idx, block) in &placed {
        if entry_idx == usize::MAX {
            hash_words.extend_from_slice(&[0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF]);
        } else {
            let name = entries[entry_idx].0;
            hash_words.extend_from_slice(&[
                hash_string(name, HashType::NameA),
                hash_string(name, HashType::NameB),
                0,
                block,
            ]);
        }
    }

    let hash_offset = 32 + file_data.len();
    let block_offset = hash_offset + HASH_SLOTS * 16;

    let mut body = Vec::new();
    body.extend_from_slice(archive::ARCHIVE_MAGIC);
    body.extend_from_slice(&32u32.to_le_bytes());
    body.extend_from_slice(&((block_offset + entries.len() * 16) as u32).to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&3u16.to_le_bytes());
    body.extend_from_slice(&(hash_offset as u32).to_le_bytes());
    body.extend_from_slice(&(block_offset as u32).to_le_bytes());
    body.extend_from_slice(&(HASH_SLOTS as u32).to_le_bytes());
    body.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    body.extend_from_slice(&file_data);

    let hash_key = hash_string("(hash table)", HashType::TableKey);
    body.extend_from_slice(&table_words_to_bytes(&encrypt(&hash_words, hash_key)));
    let block_key = hash_string("(block table)", HashType::TableKey);
    body.extend_from_slice(&table_words_to_bytes(&encrypt(&block_words, block_key)));

    archive.extend_from_slice(&body);
    archive
}

/// Builds a whole replay file around the given event streams.
#[must_use]
pub fn build_replay(
    base_build: u32,
    players: &[FixturePlayer],
    tracker: Vec<u8>,
    messages: Vec<u8>,
) -> Vec<u8> {
    build_replay_titled("Zone Control CE", base_build, players, tracker, messages)
}

/// Like [`build_replay`] with an explicit map title.
#[must_use]
pub fn build_replay_titled(
    title: &str,
    base_build: u32,
    players: &[FixturePlayer],
    tracker: Vec<u8>,
    messages: Vec<u8>,
) -> Vec<u8> {
    build_archive(
        &header_content(i64::from(base_build), 30_000),
        &[
            (archive::GAME_METADATA, metadata_entry(title, base_build)),
            (archive::INIT_DATA, init_data_entry(players)),
            (archive::DETAILS, details_entry(title, players)),
            (archive::TRACKER_EVENTS, tracker),
            (archive::GAME_EVENTS, game_events_entry(4242)),
            (archive::MESSAGE_EVENTS, messages),
            (archive::ATTRIBUTE_EVENTS, attributes_entry()),
        ],
    )
}
