//! Binary reading utilities for parsing replay archives.
//!
//! This module provides functions for reading little-endian integers,
//! byte slices, and strings from byte buffers. All functions perform
//! bounds checking and return appropriate errors for truncated or
//! malformed data.
//!
//! # Endianness
//!
//! MPQ archive structures and the fixed-layout attribute stream use
//! little-endian byte order for multi-byte integers. The functions in
//! this module handle the conversion automatically.
//!
//! # Example
//!
//! ```
//! use zc_parser::binary::{read_u16_le, read_u32_le, read_bytes};
//!
//! let data = [0x4D, 0x50, 0x51, 0x1A, 0xD0, 0x00, 0x00, 0x00];
//!
//! // The MPQ archive magic
//! assert_eq!(read_bytes(&data, 0, 4).unwrap(), b"MPQ\x1A");
//!
//! // Header size at offset 4
//! assert_eq!(read_u32_le(&data, 4).unwrap(), 0xD0);
//!
//! // Low half of the same field
//! assert_eq!(read_u16_le(&data, 4).unwrap(), 0xD0);
//! ```

use crate::error::{ParserError, Result};

/// Reads a single byte from the buffer at the given offset.
///
/// # Errors
///
/// Returns `ParserError::UnexpectedEof` if the offset is beyond the
/// buffer.
pub fn read_u8(bytes: &[u8], offset: usize) -> Result<u8> {
    bytes
        .get(offset)
        .copied()
        .ok_or_else(|| ParserError::unexpected_eof(offset + 1, bytes.len()))
}

/// Reads a little-endian u16 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ParserError::UnexpectedEof` if the buffer doesn't contain
/// at least 2 bytes starting from the given offset.
///
/// # Example
///
/// ```
/// use zc_parser::binary::read_u16_le;
///
/// let data = [0x34, 0x12, 0xFF, 0xFF];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0xFFFF);
/// ```
pub fn read_u16_le(bytes: &[u8], offset: usize) -> Result<u16> {
    const SIZE: usize = 2;

    if offset + SIZE > bytes.len() {
        return Err(ParserError::unexpected_eof(offset + SIZE, bytes.len()));
    }

    let slice = &bytes[offset..offset + SIZE];
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

/// Reads a little-endian u32 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ParserError::UnexpectedEof` if the buffer doesn't contain
/// at least 4 bytes starting from the given offset.
///
/// # Example
///
/// ```
/// use zc_parser::binary::read_u32_le;
///
/// let data = [0x78, 0x56, 0x34, 0x12];
/// assert_eq!(read_u32_le(&data, 0).unwrap(), 0x12345678);
/// ```
pub fn read_u32_le(bytes: &[u8], offset: usize) -> Result<u32> {
    const SIZE: usize = 4;

    if offset + SIZE > bytes.len() {
        return Err(ParserError::unexpected_eof(offset + SIZE, bytes.len()));
    }

    let slice = &bytes[offset..offset + SIZE];
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Reads a little-endian u64 value from the byte buffer at the given offset.
///
/// # Errors
///
/// Returns `ParserError::UnexpectedEof` if the buffer doesn't contain
/// at least 8 bytes starting from the given offset.
pub fn read_u64_le(bytes: &[u8], offset: usize) -> Result<u64> {
    const SIZE: usize = 8;

    if offset + SIZE > bytes.len() {
        return Err(ParserError::unexpected_eof(offset + SIZE, bytes.len()));
    }

    let mut buf = [0u8; SIZE];
    buf.copy_from_slice(&bytes[offset..offset + SIZE]);
    Ok(u64::from_le_bytes(buf))
}

/// Reads a slice of bytes from the buffer at the given offset.
///
/// # Errors
///
/// Returns `ParserError::UnexpectedEof` if the buffer doesn't contain
/// at least `len` bytes starting from the given offset.
///
/// # Example
///
/// ```
/// use zc_parser::binary::read_bytes;
///
/// let data = b"MPQ\x1A\xD0\x00\x00\x00";
/// let magic = read_bytes(data, 0, 4).unwrap();
/// assert_eq!(magic, b"MPQ\x1A");
/// ```
pub fn read_bytes(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    if offset + len > bytes.len() {
        return Err(ParserError::unexpected_eof(offset + len, bytes.len()));
    }

    Ok(&bytes[offset..offset + len])
}

/// Reads a UTF-8 string of exactly `len` bytes from the buffer.
///
/// # Errors
///
/// - Returns `ParserError::UnexpectedEof` if offset + len is beyond the buffer
/// - Returns `ParserError::InvalidArchive` if the bytes are not valid UTF-8
///
/// # Example
///
/// ```
/// use zc_parser::binary::read_string;
///
/// let data = b"Bunker\x00\x00";
/// let s = read_string(data, 0, 6).unwrap();
/// assert_eq!(s, "Bunker");
/// ```
pub fn read_string(bytes: &[u8], offset: usize, len: usize) -> Result<String> {
    let slice = read_bytes(bytes, offset, len)?;

    String::from_utf8(slice.to_vec()).map_err(|e| ParserError::InvalidArchive {
        reason: format!("Invalid UTF-8 string at offset {offset}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================
    // read_u8 tests
    // ========================

    #[test]
    fn test_read_u8_basic() {
        let data = [0xAB, 0xCD];
        assert_eq!(read_u8(&data, 0).unwrap(), 0xAB);
        assert_eq!(read_u8(&data, 1).unwrap(), 0xCD);
    }

    #[test]
    fn test_read_u8_overflow() {
        let data = [0xAB];
        let result = read_u8(&data, 1);
        assert!(matches!(result, Err(ParserError::UnexpectedEof { .. })));
    }

    // ========================
    // read_u16_le tests
    // ========================

    #[test]
    fn test_read_u16_le_basic() {
        let data = [0x34, 0x12];
        assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
    }

    #[test]
    fn test_read_u16_le_with_offset() {
        let data = [0x00, 0x00, 0x34, 0x12, 0xFF, 0xFF];
        assert_eq!(read_u16_le(&data, 2).unwrap(), 0x1234);
        assert_eq!(read_u16_le(&data, 4).unwrap(), 0xFFFF);
    }

    #[test]
    fn test_read_u16_le_overflow() {
        let data = [0x34, 0x12];
        let result = read_u16_le(&data, 1);
        assert!(matches!(
            result,
            Err(ParserError::UnexpectedEof {
                expected: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_read_u16_le_empty() {
        let data: [u8; 0] = [];
        let result = read_u16_le(&data, 0);
        assert!(matches!(result, Err(ParserError::UnexpectedEof { .. })));
    }

    // ========================
    // read_u32_le tests
    // ========================

    #[test]
    fn test_read_u32_le_basic() {
        let data = [0x78, 0x56, 0x34, 0x12];
        assert_eq!(read_u32_le(&data, 0).unwrap(), 0x12345678);
    }

    #[test]
    fn test_read_u32_le_header_size() {
        // MPQ v1 archive header size stored as: D0 00 00 00
        let data = [0xD0, 0x00, 0x00, 0x00];
        assert_eq!(read_u32_le(&data, 0).unwrap(), 208);
    }

    #[test]
    fn test_read_u32_le_too_short() {
        let data = [0x78, 0x56, 0x34];
        let result = read_u32_le(&data, 0);
        assert!(matches!(
            result,
            Err(ParserError::UnexpectedEof {
                expected: 4,
                available: 3
            })
        ));
    }

    // ========================
    // read_u64_le tests
    // ========================

    #[test]
    fn test_read_u64_le_basic() {
        let data = [0xEF, 0xCD, 0xAB, 0x89, 0x67, 0x45, 0x23, 0x01];
        assert_eq!(read_u64_le(&data, 0).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_read_u64_le_overflow() {
        let data = [0x00; 7];
        let result = read_u64_le(&data, 0);
        assert!(matches!(result, Err(ParserError::UnexpectedEof { .. })));
    }

    // ========================
    // read_bytes tests
    // ========================

    #[test]
    fn test_read_bytes_basic() {
        let data = b"MPQ\x1A\xD0\x00\x00\x00";
        let magic = read_bytes(data, 0, 4).unwrap();
        assert_eq!(magic, b"MPQ\x1A");
    }

    #[test]
    fn test_read_bytes_with_offset() {
        let data = b"\x00\x00MPQ\x1B";
        let magic = read_bytes(data, 2, 4).unwrap();
        assert_eq!(magic, b"MPQ\x1B");
    }

    #[test]
    fn test_read_bytes_overflow() {
        let data = b"MPQ\x1A";
        let result = read_bytes(data, 2, 4);
        assert!(matches!(
            result,
            Err(ParserError::UnexpectedEof {
                expected: 6,
                available: 4
            })
        ));
    }

    #[test]
    fn test_read_bytes_zero_length() {
        let data = b"MPQ\x1A";
        let result = read_bytes(data, 2, 0).unwrap();
        assert_eq!(result, &[] as &[u8]);
    }

    // ========================
    // read_string tests
    // ========================

    #[test]
    fn test_read_string_basic() {
        let data = b"replay.details";
        let s = read_string(data, 7, 7).unwrap();
        assert_eq!(s, "details");
    }

    #[test]
    fn test_read_string_invalid_utf8() {
        let data = [0xFF, 0xFE, 0x00];
        let result = read_string(&data, 0, 3);
        assert!(matches!(result, Err(ParserError::InvalidArchive { .. })));
    }

    #[test]
    fn test_read_string_overflow() {
        let data = b"ab";
        let result = read_string(data, 0, 8);
        assert!(matches!(result, Err(ParserError::UnexpectedEof { .. })));
    }
}
