//! Error types for the Zone Control replay parser.
//!
//! This module defines the error hierarchy for every failure case during
//! replay parsing: I/O, archive validation, decompression, protocol
//! selection, stream decoding, and match-level rejection (wrong map,
//! abandoned game).
//!
//! Terminal errors (`NotExpectedFormat`, `IncompleteMatch`,
//! `ProtocolUnavailable`) abort the entire parse; callers must treat an
//! aborted parse as producing nothing usable. Identity-resolution misses
//! are *not* represented here because they never abort a parse — the
//! state machine logs and skips the single affected event instead.

use thiserror::Error;

/// The main error type for replay parsing operations.
///
/// # Example
///
/// ```
/// use zc_parser::error::{ParserError, Result};
///
/// fn example_operation() -> Result<()> {
///     Err(ParserError::InvalidArchive {
///         reason: "missing hash table".to_string(),
///     })
/// }
/// ```
#[derive(Error, Debug)]
pub enum ParserError {
    /// An I/O error occurred while reading the replay file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file's magic bytes do not match an MPQ archive.
    ///
    /// `.SC2Replay` files must start with either `MPQ\x1B` (user-data
    /// header) or `MPQ\x1A` (archive header).
    #[error("Invalid magic bytes: expected {expected}, found {found}")]
    InvalidMagic {
        /// The expected magic bytes (as hex string for display).
        expected: String,
        /// The actual bytes found (as hex string).
        found: String,
    },

    /// The archive structure is malformed: bad table sizes, an entry
    /// pointing outside the file, or a missing named entry.
    #[error("Invalid archive: {reason}")]
    InvalidArchive {
        /// A description of what makes the archive invalid.
        reason: String,
    },

    /// Decompression of an archive sector failed or used an unsupported
    /// compression method.
    #[error("Decompression failed: {reason}")]
    DecompressionError {
        /// A description of the decompression failure.
        reason: String,
    },

    /// The data ended before the required bytes could be read.
    #[error("Unexpected end of data: expected {expected} bytes, but only {available} available")]
    UnexpectedEof {
        /// The number of bytes that were expected to be available.
        expected: usize,
        /// The actual number of bytes available.
        available: usize,
    },

    /// A versioned event stream contained a malformed record.
    #[error("Decode error at offset {offset}: {reason}")]
    DecodeError {
        /// Byte offset into the sub-stream where decoding failed.
        offset: usize,
        /// A description of the malformed record.
        reason: String,
    },

    /// The archive's declared game/map is not Zone Control CE.
    ///
    /// Raised before any match state is built; the container belongs to
    /// a different game type and nothing in it is decodable by this
    /// crate's schema.
    #[error("Not a Zone Control replay: {reason}")]
    NotExpectedFormat {
        /// The title (or other marker) that failed validation.
        reason: String,
    },

    /// No player result in the details stream indicates a win.
    ///
    /// The recording was abandoned before the match completed; replaying
    /// its events would produce a match with no determinable outcome.
    #[error("Incomplete match: {reason}")]
    IncompleteMatch {
        /// A description of the completeness check that failed.
        reason: String,
    },

    /// No usable protocol schema exists for the replay's build number,
    /// even after trying the nearest known builds below and above it.
    #[error("No protocol available for build {build} (tried {tried:?})")]
    ProtocolUnavailable {
        /// The base build embedded in the replay header.
        build: u32,
        /// The bracket builds that were attempted.
        tried: Vec<u32>,
    },

    /// The embedded game metadata JSON could not be decoded.
    #[error("Invalid game metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),
}

impl ParserError {
    /// Creates an `InvalidMagic` error with the given byte slices.
    ///
    /// The bytes are converted to hex strings for human-readable display.
    #[must_use]
    pub fn invalid_magic(expected: &[u8], found: &[u8]) -> Self {
        ParserError::InvalidMagic {
            expected: bytes_to_hex(expected),
            found: bytes_to_hex(found),
        }
    }

    /// Creates an `UnexpectedEof` error with the given sizes.
    #[must_use]
    pub fn unexpected_eof(expected: usize, available: usize) -> Self {
        ParserError::UnexpectedEof {
            expected,
            available,
        }
    }

    /// Creates a `DecodeError` at the given sub-stream offset.
    #[must_use]
    pub fn decode(offset: usize, reason: impl Into<String>) -> Self {
        ParserError::DecodeError {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns whether this error aborts the whole parse.
    ///
    /// Terminal errors must be surfaced to the caller as distinguishable
    /// failures and must never be confused with an empty-but-successful
    /// result. `DecodeError` and `UnexpectedEof` are the recoverable
    /// cases: both are how a mismatched schema fails, so the batch
    /// parser retries them once with the other bracket protocol before
    /// escalating to `ProtocolUnavailable`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ParserError::DecodeError { .. } | ParserError::UnexpectedEof { .. }
        )
    }
}

/// Converts a byte slice to a hexadecimal string representation.
///
/// If the slice is 8 bytes or less, formats as space-separated hex values.
/// If longer, shows the first 8 bytes followed by "...".
fn bytes_to_hex(bytes: &[u8]) -> String {
    if bytes.len() <= 8 {
        bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        let prefix: String = bytes[..8]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{prefix}... ({} bytes total)", bytes.len())
    }
}

/// A specialized Result type for replay parsing operations.
pub type Result<T> = std::result::Result<T, ParserError>;
