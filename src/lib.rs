//! # ZC Parser
//!
//! A StarCraft II replay (.SC2Replay) parser library for the Zone
//! Control CE arcade map.
//!
//! This library reads the MPQ compound archive, decodes the versioned
//! protocol event streams across all supported game builds, and runs a
//! single-pass match state machine that reconstructs the full course
//! of a Zone Control game:
//! - **Archive** access with encrypted-table decryption and zlib
//!   sector decompression
//! - **Protocol** decoding with nearest-build fallback when a replay
//!   was recorded on an unknown game version
//! - **Match reconstruction**: eliminations, bunker and tank builds,
//!   nukes, ownership transfers, chat, and milestone snapshots
//!
//! ## Quick Start
//!
//! ```no_run
//! use zc_parser::error::Result;
//! use zc_parser::Replay;
//!
//! fn summarize(data: &[u8]) -> Result<()> {
//!     let replay = Replay::open(data)?;
//!
//!     println!("Build: {}", replay.header().base_build);
//!     println!("Players: {}", replay.details().players.len());
//!
//!     let parsed = replay.parse()?;
//!     println!("Length: {:.0}s", parsed.game_length);
//!     match parsed.winner {
//!         Some(team) => println!("Winner: team {team}"),
//!         None => println!("Draw"),
//!     }
//!     for event in &parsed.match_events {
//!         println!("[{:>7.1}] {}", event.game_time, event.description);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`error`] - Error types and result alias for parser operations
//! - [`binary`] - Low-level binary reading utilities for little-endian data
//! - [`archive`] - MPQ compound archive reading and entry extraction
//! - [`protocol`] - Versioned event stream decoding and build selection
//! - [`replay`] - Identity resolution, match state machine, streaming
//!   and batch parsing
//!
//! ## Format Reference
//!
//! An `.SC2Replay` file is an MPQ archive with a user-data header that
//! embeds the versioned replay header (carrying the base build). Named
//! archive entries hold independent sub-streams; the tracker, message,
//! and game event streams use the self-describing tagged encoding
//! decoded by [`protocol::versioned`]. All multi-byte integers in the
//! archive layer are little-endian.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod binary;
pub mod error;
pub mod protocol;
pub mod replay;

// Re-export commonly used types at the crate root
pub use archive::{GameMetadata, MpqArchive};
pub use error::{ParserError, Result};
pub use protocol::events::{
    MessageEvent, ScoreSnapshot, TrackerEvent, TrackerEventKind, UnitTag,
};
pub use protocol::{Protocol, ReplayHeader, KNOWN_BUILDS};
pub use replay::classify::{MatchEvent, MatchEventKind};
pub use replay::player::{Player, PlayerId, PlayerSnapshot, Roster, TeamId};
pub use replay::segments::{SegmentCapture, SegmentKind};
pub use replay::state::{MatchState, StreamPayload};
pub use replay::stream::{ReplayStream, StreamItem};
pub use replay::{ParsedMatch, Replay, ReplayInfo};
