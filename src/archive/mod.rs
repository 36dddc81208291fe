//! MPQ compound-archive reading for `.SC2Replay` files.
//!
//! A StarCraft II replay is an MPQ archive: a user-data header carrying
//! the versioned replay header (the source of the `baseBuild` number),
//! followed by a conventional MPQ archive whose named entries are the
//! independently-schematized sub-streams (metadata, init data, details,
//! tracker/game/message/attribute events).
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00 | 4 | User-data magic `MPQ\x1B` |
//! | 0x04 | 4 | u32 LE — user data size |
//! | 0x08 | 4 | u32 LE — archive header offset |
//! | 0x0C | 4 | u32 LE — user-data content size |
//! | 0x10 | var | Content (the versioned replay header) |
//!
//! The archive header (`MPQ\x1A`) sits at the recorded offset and is
//! followed, at offsets relative to itself, by the encrypted hash and
//! block tables. File extraction is lazy: nothing beyond the two headers
//! is touched until a named entry is requested.
//!
//! # Example
//!
//! ```ignore
//! use zc_parser::archive::{MpqArchive, TRACKER_EVENTS};
//!
//! let bytes = std::fs::read("match.SC2Replay")?;
//! let archive = MpqArchive::open(&bytes)?;
//! let meta = archive.metadata()?;
//! println!("map: {}", meta.title);
//! let tracker = archive.read_file(TRACKER_EVENTS)?;
//! ```

pub mod crypt;

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::Deserialize;

use crate::binary::{read_bytes, read_u16_le, read_u32_le};
use crate::error::{ParserError, Result};
use crypt::{bytes_to_words, decrypt, hash_string, words_to_bytes, HashType};

/// Magic bytes of the MPQ user-data header.
pub const USER_DATA_MAGIC: &[u8; 4] = b"MPQ\x1B";

/// Magic bytes of the MPQ archive header.
pub const ARCHIVE_MAGIC: &[u8; 4] = b"MPQ\x1A";

/// Archive entry: embedded game metadata (JSON).
pub const GAME_METADATA: &str = "replay.gamemetadata.json";

/// Archive entry: lobby/init data.
pub const INIT_DATA: &str = "replay.initData";

/// Archive entry: match details (roster, results, colors).
pub const DETAILS: &str = "replay.details";

/// Archive entry: tracker event stream.
pub const TRACKER_EVENTS: &str = "replay.tracker.events";

/// Archive entry: game event stream.
pub const GAME_EVENTS: &str = "replay.game.events";

/// Archive entry: message event stream.
pub const MESSAGE_EVENTS: &str = "replay.message.events";

/// Archive entry: attribute event stream.
pub const ATTRIBUTE_EVENTS: &str = "replay.attributes.events";

/// The named sub-streams every Zone Control replay carries.
pub const STREAM_ENTRIES: &[&str] = &[
    GAME_METADATA,
    INIT_DATA,
    DETAILS,
    TRACKER_EVENTS,
    GAME_EVENTS,
    MESSAGE_EVENTS,
    ATTRIBUTE_EVENTS,
];

/// Block flag: the entry is present.
const FLAG_EXISTS: u32 = 0x8000_0000;

/// Block flag: the file is encrypted.
const FLAG_ENCRYPTED: u32 = 0x0001_0000;

/// Block flag: the file is compressed (multi-method byte prefix).
const FLAG_COMPRESS: u32 = 0x0000_0200;

/// Block flag: the file is stored as one block, not sectored.
const FLAG_SINGLE_UNIT: u32 = 0x0100_0000;

/// Compression method byte: zlib/deflate.
const COMPRESSION_ZLIB: u8 = 0x02;

/// Compression method byte: bzip2 (present in the wild, not supported).
const COMPRESSION_BZIP2: u8 = 0x10;

/// Hash-table sentinel for a never-used slot.
const HASH_ENTRY_EMPTY: u32 = 0xFFFF_FFFF;

/// The parsed user-data header preceding the archive proper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    /// Maximum size reserved for the user data block.
    pub user_data_size: u32,
    /// Absolute offset of the archive header.
    pub header_offset: u32,
    /// The content bytes: the versioned replay header record.
    pub content: Vec<u8>,
}

/// The MPQ archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Size of this header structure.
    pub header_size: u32,
    /// Total archive size in bytes.
    pub archive_size: u32,
    /// MPQ format version.
    pub format_version: u16,
    /// Sector size is `512 << sector_size_shift`.
    pub sector_size_shift: u16,
    /// Hash table offset, relative to this header.
    pub hash_table_offset: u32,
    /// Block table offset, relative to this header.
    pub block_table_offset: u32,
    /// Number of hash table entries (a power of two).
    pub hash_table_entries: u32,
    /// Number of block table entries.
    pub block_table_entries: u32,
}

/// One decrypted hash-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HashEntry {
    name_a: u32,
    name_b: u32,
    block_index: u32,
}

/// One decrypted block-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockEntry {
    offset: u32,
    archived_size: u32,
    size: u32,
    flags: u32,
}

/// Game metadata embedded as JSON in the archive.
///
/// Only the fields the parser consumes are modeled; unknown fields are
/// ignored so metadata additions in newer game versions do not break
/// decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct GameMetadata {
    /// The map title. Validated against the expected Zone Control names.
    #[serde(rename = "Title")]
    pub title: String,

    /// Human-readable game version, e.g. `"4.11.3.78285"`.
    #[serde(rename = "GameVersion", default)]
    pub game_version: Option<String>,

    /// Data build identifier.
    #[serde(rename = "DataBuild", default)]
    pub data_build: Option<String>,

    /// Base build identifier, e.g. `"Base78285"`.
    #[serde(rename = "BaseBuild", default)]
    pub base_build: Option<String>,

    /// Match duration in seconds, when recorded.
    #[serde(rename = "Duration", default)]
    pub duration: Option<u32>,
}

/// A read-only view over one `.SC2Replay` compound archive.
///
/// Opening validates the two headers and decrypts the lookup tables;
/// named entries are extracted independently and on demand via
/// [`MpqArchive::read_file`]. The archive never writes back.
pub struct MpqArchive<'a> {
    data: &'a [u8],
    user_data: UserData,
    header: ArchiveHeader,
    header_offset: usize,
    hash_table: Vec<HashEntry>,
    block_table: Vec<BlockEntry>,
}

impl<'a> MpqArchive<'a> {
    /// Opens an archive over the given replay bytes.
    ///
    /// # Errors
    ///
    /// - `ParserError::InvalidMagic` if the user-data or archive magic is
    ///   missing
    /// - `ParserError::InvalidArchive` if a table offset or size points
    ///   outside the file
    /// - `ParserError::UnexpectedEof` if the file is truncated
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let magic = read_bytes(data, 0, 4)?;
        if magic != USER_DATA_MAGIC {
            return Err(ParserError::invalid_magic(USER_DATA_MAGIC, magic));
        }

        let user_data_size = read_u32_le(data, 4)?;
        let header_offset = read_u32_le(data, 8)?;
        let content_size = read_u32_le(data, 12)?;
        let content = read_bytes(data, 16, content_size as usize)?.to_vec();

        let user_data = UserData {
            user_data_size,
            header_offset,
            content,
        };

        let header_offset = header_offset as usize;
        let header = Self::parse_archive_header(data, header_offset)?;

        let hash_table = Self::read_table(
            data,
            header_offset + header.hash_table_offset as usize,
            header.hash_table_entries as usize,
            "(hash table)",
        )?
        .chunks_exact(4)
        .map(|w| HashEntry {
            name_a: w[0],
            name_b: w[1],
            block_index: w[3],
        })
        .collect();

        let block_table = Self::read_table(
            data,
            header_offset + header.block_table_offset as usize,
            header.block_table_entries as usize,
            "(block table)",
        )?
        .chunks_exact(4)
        .map(|w| BlockEntry {
            offset: w[0],
            archived_size: w[1],
            size: w[2],
            flags: w[3],
        })
        .collect();

        Ok(MpqArchive {
            data,
            user_data,
            header,
            header_offset,
            hash_table,
            block_table,
        })
    }

    fn parse_archive_header(data: &[u8], offset: usize) -> Result<ArchiveHeader> {
        let magic = read_bytes(data, offset, 4)?;
        if magic != ARCHIVE_MAGIC {
            return Err(ParserError::invalid_magic(ARCHIVE_MAGIC, magic));
        }

        Ok(ArchiveHeader {
            header_size: read_u32_le(data, offset + 4)?,
            archive_size: read_u32_le(data, offset + 8)?,
            format_version: read_u16_le(data, offset + 12)?,
            sector_size_shift: read_u16_le(data, offset + 14)?,
            hash_table_offset: read_u32_le(data, offset + 16)?,
            block_table_offset: read_u32_le(data, offset + 20)?,
            hash_table_entries: read_u32_le(data, offset + 24)?,
            block_table_entries: read_u32_le(data, offset + 28)?,
        })
    }

    /// Reads and decrypts a 16-byte-entry table, returning raw words.
    fn read_table(data: &[u8], offset: usize, entries: usize, key_name: &str) -> Result<Vec<u32>> {
        let byte_len = entries
            .checked_mul(16)
            .ok_or_else(|| ParserError::InvalidArchive {
                reason: format!("table entry count overflows: {entries}"),
            })?;
        let raw = read_bytes(data, offset, byte_len)?;

        let key = hash_string(key_name, HashType::TableKey);
        Ok(decrypt(&bytes_to_words(raw), key))
    }

    /// Returns the user-data header, whose content carries the versioned
    /// replay header record.
    #[must_use]
    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    /// Returns the parsed archive header.
    #[must_use]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Returns the sector size in bytes for sectored files.
    #[must_use]
    pub fn sector_size(&self) -> usize {
        512usize << self.header.sector_size_shift
    }

    /// Returns whether the archive contains the named entry.
    #[must_use]
    pub fn has_file(&self, name: &str) -> bool {
        self.find_hash_entry(name).is_some()
    }

    /// Returns the known sub-stream names present in this archive.
    #[must_use]
    pub fn present_entries(&self) -> Vec<&'static str> {
        STREAM_ENTRIES
            .iter()
            .copied()
            .filter(|name| self.has_file(name))
            .collect()
    }

    /// Decodes the embedded `replay.gamemetadata.json` entry.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::InvalidArchive` if the entry is missing, or
    /// `ParserError::InvalidMetadata` if the JSON does not decode.
    pub fn metadata(&self) -> Result<GameMetadata> {
        let raw = self.read_file(GAME_METADATA)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Extracts one named entry, decompressing as needed.
    ///
    /// # Errors
    ///
    /// - `ParserError::InvalidArchive` if the entry is missing or its
    ///   block points outside the file
    /// - `ParserError::DecompressionError` for corrupt zlib data or an
    ///   unsupported compression method
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let hash_entry = self
            .find_hash_entry(name)
            .ok_or_else(|| ParserError::InvalidArchive {
                reason: format!("archive entry not found: {name}"),
            })?;

        let block = self
            .block_table
            .get(hash_entry.block_index as usize)
            .ok_or_else(|| ParserError::InvalidArchive {
                reason: format!(
                    "hash entry for {name} points to invalid block {}",
                    hash_entry.block_index
                ),
            })?;

        if block.flags & FLAG_EXISTS == 0 {
            return Err(ParserError::InvalidArchive {
                reason: format!("block for {name} is marked deleted"),
            });
        }
        if block.flags & FLAG_ENCRYPTED != 0 {
            // SC2 replays never encrypt entries; no key derivation here.
            return Err(ParserError::InvalidArchive {
                reason: format!("encrypted entry not supported: {name}"),
            });
        }

        let file_offset = self.header_offset + block.offset as usize;
        let raw = read_bytes(self.data, file_offset, block.archived_size as usize)?;

        if block.flags & FLAG_COMPRESS == 0 {
            return Ok(raw.to_vec());
        }

        if block.flags & FLAG_SINGLE_UNIT != 0 {
            if block.archived_size == block.size {
                return Ok(raw.to_vec());
            }
            return decompress_sector(raw, block.size as usize);
        }

        self.read_sectored(raw, block)
    }

    /// Extracts a sector-based compressed file.
    fn read_sectored(&self, raw: &[u8], block: &BlockEntry) -> Result<Vec<u8>> {
        let sector_size = self.sector_size();
        let total = block.size as usize;
        let sectors = total.div_ceil(sector_size);

        // Sector offset table: sectors + 1 u32 entries, relative to the
        // start of the file data.
        let mut offsets = Vec::with_capacity(sectors + 1);
        for i in 0..=sectors {
            offsets.push(read_u32_le(raw, i * 4)? as usize);
        }

        let mut output = Vec::with_capacity(total);
        for i in 0..sectors {
            let (start, end) = (offsets[i], offsets[i + 1]);
            if start > end || end > raw.len() {
                return Err(ParserError::InvalidArchive {
                    reason: format!("sector {i} bounds out of range: {start}..{end}"),
                });
            }

            let expected = sector_size.min(total - output.len());
            let sector = &raw[start..end];
            if sector.len() == expected {
                // Stored uncompressed when compression would not shrink it.
                output.extend_from_slice(sector);
            } else {
                output.extend_from_slice(&decompress_sector(sector, expected)?);
            }
        }

        Ok(output)
    }

    /// Locates the hash-table slot for a file name, if any.
    fn find_hash_entry(&self, name: &str) -> Option<&HashEntry> {
        let entries = self.hash_table.len();
        if entries == 0 {
            return None;
        }

        let name_a = hash_string(name, HashType::NameA);
        let name_b = hash_string(name, HashType::NameB);
        let start = hash_string(name, HashType::TableOffset) as usize & (entries - 1);

        // Linear probe with wraparound; a never-used slot ends the chain.
        for probe in 0..entries {
            let entry = &self.hash_table[(start + probe) % entries];
            if entry.block_index == HASH_ENTRY_EMPTY {
                return None;
            }
            if entry.name_a == name_a && entry.name_b == name_b {
                return Some(entry);
            }
        }

        None
    }
}

/// Decompresses one sector whose first byte declares the method.
fn decompress_sector(sector: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let (&method, payload) = sector
        .split_first()
        .ok_or_else(|| ParserError::DecompressionError {
            reason: "empty sector".to_string(),
        })?;

    match method {
        COMPRESSION_ZLIB => {
            let mut decoder = ZlibDecoder::new(payload);
            let mut output = Vec::with_capacity(expected_size);
            decoder
                .read_to_end(&mut output)
                .map_err(|e| ParserError::DecompressionError {
                    reason: format!("zlib: {e}"),
                })?;
            Ok(output)
        }
        COMPRESSION_BZIP2 => Err(ParserError::DecompressionError {
            reason: "bzip2 compression not supported".to_string(),
        }),
        other => Err(ParserError::DecompressionError {
            reason: format!("unknown compression method 0x{other:02X}"),
        }),
    }
}

// Re-exported for archive tooling and fixture builders.
pub use crypt::encrypt;

/// Serializes u32 table words for writers; inverse of the decrypt path.
#[must_use]
pub fn table_words_to_bytes(words: &[u32]) -> Vec<u8> {
    words_to_bytes(words)
}
