//! Decoder for the self-describing ("versioned") tagged byte format.
//!
//! The replay header and the tracker/game/message event sub-streams are
//! encoded in a tagged format where every value is preceded by a type
//! tag byte. The format is self-describing: a decoder can walk any
//! value without a schema, producing a generic [`Value`] tree; schemas
//! only assign *meaning* to struct field tags, which is what makes
//! nearest-version fallback possible.
//!
//! # Tags
//!
//! | Tag | Type | Payload |
//! |-----|------|---------|
//! | 0x00 | array | vint count, then count values |
//! | 0x01 | bitblob | vint bit length, then ceil(len/8) bytes |
//! | 0x02 | blob | vint byte length, then bytes |
//! | 0x03 | choice | vint variant tag, then one value |
//! | 0x04 | optional | u8 flag, then one value when nonzero |
//! | 0x05 | struct | vint field count, then count x (vint field tag, value) |
//! | 0x06 | u8 | 1 byte |
//! | 0x07 | u32 | 4 bytes LE |
//! | 0x08 | u64 | 8 bytes LE |
//! | 0x09 | vint | variable-length signed integer |
//!
//! Variable-length integers store the sign in bit 0 of the first byte,
//! six payload bits in the first byte and seven in each continuation
//! byte, with bit 7 as the continuation flag.
//!
//! Decoding is pure: a [`VersionedDecoder`] holds only a slice and an
//! offset, and no state is retained across distinct sub-streams.
//!
//! # Example
//!
//! ```
//! use zc_parser::protocol::versioned::{encode_value, Value, VersionedDecoder};
//!
//! let value = Value::Struct(vec![(0, Value::Int(42)), (1, Value::Blob(b"Bunker".to_vec()))]);
//! let bytes = encode_value(&value);
//!
//! let mut decoder = VersionedDecoder::new(&bytes);
//! let decoded = decoder.decode_value().unwrap();
//! assert_eq!(decoded.field(0).unwrap().as_int(), Some(42));
//! assert_eq!(decoded.field(1).unwrap().as_str(), Some("Bunker"));
//! ```

use crate::error::{ParserError, Result};

/// Type tag for arrays.
pub const TAG_ARRAY: u8 = 0x00;
/// Type tag for bit blobs.
pub const TAG_BITBLOB: u8 = 0x01;
/// Type tag for byte blobs.
pub const TAG_BLOB: u8 = 0x02;
/// Type tag for tagged unions.
pub const TAG_CHOICE: u8 = 0x03;
/// Type tag for optional values.
pub const TAG_OPTIONAL: u8 = 0x04;
/// Type tag for structs.
pub const TAG_STRUCT: u8 = 0x05;
/// Type tag for a raw u8.
pub const TAG_U8: u8 = 0x06;
/// Type tag for a raw little-endian u32.
pub const TAG_U32: u8 = 0x07;
/// Type tag for a raw little-endian u64.
pub const TAG_U64: u8 = 0x08;
/// Type tag for a variable-length signed integer.
pub const TAG_VINT: u8 = 0x09;

/// A generic decoded value.
///
/// Struct fields keep their numeric field tags; schemas in
/// [`crate::protocol`] map tags to meanings per build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// A bit-granular blob (length in bits plus packed bytes).
    BitBlob {
        /// Number of significant bits.
        bits: u64,
        /// The packed bytes.
        data: Vec<u8>,
    },
    /// A byte blob; strings are blobs of UTF-8.
    Blob(Vec<u8>),
    /// A tagged union variant.
    Choice {
        /// The variant tag.
        tag: i64,
        /// The wrapped value.
        value: Box<Value>,
    },
    /// An optional value.
    Optional(Option<Box<Value>>),
    /// A struct as (field tag, value) pairs in stream order.
    Struct(Vec<(i64, Value)>),
    /// A raw byte.
    U8(u8),
    /// A raw little-endian u32.
    U32(u32),
    /// A raw little-endian u64.
    U64(u64),
    /// A variable-length signed integer.
    Int(i64),
}

impl Value {
    /// Returns the value as a signed integer, unwrapping optional and
    /// choice wrappers.
    ///
    /// Covers all four integer encodings; wrappers occur wherever a
    /// schema marks an id field optional.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::U8(v) => Some(i64::from(*v)),
            Value::U32(v) => Some(i64::from(*v)),
            Value::U64(v) => i64::try_from(*v).ok(),
            Value::Optional(Some(inner)) => inner.as_int(),
            Value::Choice { value, .. } => value.as_int(),
            _ => None,
        }
    }

    /// Returns the value as a byte blob, unwrapping optional wrappers.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Optional(Some(inner)) => inner.as_blob(),
            _ => None,
        }
    }

    /// Returns the value as a UTF-8 string slice, when it is a blob of
    /// valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_blob().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the array elements, unwrapping optional wrappers.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            Value::Optional(Some(inner)) => inner.as_array(),
            _ => None,
        }
    }

    /// Looks up a struct field by tag, unwrapping optional wrappers.
    #[must_use]
    pub fn field(&self, tag: i64) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v),
            Value::Optional(Some(inner)) => inner.field(tag),
            _ => None,
        }
    }

    /// Returns whether this is an absent optional.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Optional(None))
    }
}

/// Streaming decoder over one sub-stream.
///
/// Successive [`VersionedDecoder::decode_value`] calls consume records
/// back to back, which is how event streams are framed.
#[derive(Debug)]
pub struct VersionedDecoder<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> VersionedDecoder<'a> {
    /// Creates a decoder positioned at the start of the slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        VersionedDecoder { data, offset: 0 }
    }

    /// Returns the current byte offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Moves the read position to an absolute byte offset.
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Returns whether the stream is exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn take_byte(&mut self) -> Result<u8> {
        let byte = self
            .data
            .get(self.offset)
            .copied()
            .ok_or_else(|| ParserError::unexpected_eof(self.offset + 1, self.data.len()))?;
        self.offset += 1;
        Ok(byte)
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.offset + len > self.data.len() {
            return Err(ParserError::unexpected_eof(
                self.offset + len,
                self.data.len(),
            ));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Decodes a variable-length signed integer.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::DecodeError` on overflow (more than 10
    /// bytes) or `UnexpectedEof` on truncation.
    pub fn decode_vint(&mut self) -> Result<i64> {
        let start = self.offset;
        let first = self.take_byte()?;
        let negative = first & 0x01 != 0;
        let mut value = i64::from((first >> 1) & 0x3F);
        let mut shift = 6u32;

        let mut byte = first;
        while byte & 0x80 != 0 {
            byte = self.take_byte()?;
            if shift > 62 {
                return Err(ParserError::decode(start, "vint exceeds 64 bits"));
            }
            value |= i64::from(byte & 0x7F) << shift;
            shift += 7;
        }

        Ok(if negative { -value } else { value })
    }

    /// Decodes one complete tagged value.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::DecodeError` for an unknown tag and
    /// `UnexpectedEof` for truncated payloads.
    pub fn decode_value(&mut self) -> Result<Value> {
        let tag_offset = self.offset;
        let tag = self.take_byte()?;

        match tag {
            TAG_ARRAY => {
                let count = self.decode_length(tag_offset, "array")?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.decode_value()?);
                }
                Ok(Value::Array(items))
            }
            TAG_BITBLOB => {
                let bits = self.decode_length(tag_offset, "bitblob")? as u64;
                let bytes = usize::try_from((bits + 7) / 8)
                    .map_err(|_| ParserError::decode(tag_offset, "bitblob length overflow"))?;
                Ok(Value::BitBlob {
                    bits,
                    data: self.take_bytes(bytes)?.to_vec(),
                })
            }
            TAG_BLOB => {
                let len = self.decode_length(tag_offset, "blob")?;
                Ok(Value::Blob(self.take_bytes(len)?.to_vec()))
            }
            TAG_CHOICE => {
                let variant = self.decode_vint()?;
                let value = self.decode_value()?;
                Ok(Value::Choice {
                    tag: variant,
                    value: Box::new(value),
                })
            }
            TAG_OPTIONAL => {
                let exists = self.take_byte()?;
                if exists == 0 {
                    Ok(Value::Optional(None))
                } else {
                    Ok(Value::Optional(Some(Box::new(self.decode_value()?))))
                }
            }
            TAG_STRUCT => {
                let count = self.decode_length(tag_offset, "struct")?;
                let mut fields = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let field_tag = self.decode_vint()?;
                    let value = self.decode_value()?;
                    fields.push((field_tag, value));
                }
                Ok(Value::Struct(fields))
            }
            TAG_U8 => Ok(Value::U8(self.take_byte()?)),
            TAG_U32 => {
                let bytes = self.take_bytes(4)?;
                Ok(Value::U32(u32::from_le_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            TAG_U64 => {
                let bytes = self.take_bytes(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::U64(u64::from_le_bytes(buf)))
            }
            TAG_VINT => Ok(Value::Int(self.decode_vint()?)),
            other => Err(ParserError::decode(
                tag_offset,
                format!("unknown type tag 0x{other:02X}"),
            )),
        }
    }

    /// Decodes a vint used as a length/count, rejecting negatives.
    fn decode_length(&mut self, at: usize, what: &str) -> Result<usize> {
        let raw = self.decode_vint()?;
        usize::try_from(raw).map_err(|_| ParserError::decode(at, format!("negative {what} length")))
    }
}

/// Encodes a variable-length signed integer.
fn encode_vint(out: &mut Vec<u8>, value: i64) {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();

    let mut byte = (u8::from(negative)) | ((magnitude & 0x3F) as u8) << 1;
    magnitude >>= 6;
    while magnitude != 0 {
        out.push(byte | 0x80);
        byte = (magnitude & 0x7F) as u8;
        magnitude >>= 7;
    }
    out.push(byte);
}

/// Encodes a value back into its tagged byte form.
///
/// The exact inverse of [`VersionedDecoder::decode_value`]; used by
/// archive tooling and fixture builders to synthesize valid streams.
#[must_use]
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(&mut out, value);
    out
}

fn encode_into(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            encode_vint(out, items.len() as i64);
            for item in items {
                encode_into(out, item);
            }
        }
        Value::BitBlob { bits, data } => {
            out.push(TAG_BITBLOB);
            encode_vint(out, *bits as i64);
            out.extend_from_slice(data);
        }
        Value::Blob(bytes) => {
            out.push(TAG_BLOB);
            encode_vint(out, bytes.len() as i64);
            out.extend_from_slice(bytes);
        }
        Value::Choice { tag, value } => {
            out.push(TAG_CHOICE);
            encode_vint(out, *tag);
            encode_into(out, value);
        }
        Value::Optional(inner) => {
            out.push(TAG_OPTIONAL);
            match inner {
                None => out.push(0),
                Some(value) => {
                    out.push(1);
                    encode_into(out, value);
                }
            }
        }
        Value::Struct(fields) => {
            out.push(TAG_STRUCT);
            encode_vint(out, fields.len() as i64);
            for (tag, value) in fields {
                encode_vint(out, *tag);
                encode_into(out, value);
            }
        }
        Value::U8(v) => {
            out.push(TAG_U8);
            out.push(*v);
        }
        Value::U32(v) => {
            out.push(TAG_U32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::U64(v) => {
            out.push(TAG_U64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Int(v) => {
            out.push(TAG_VINT);
            encode_vint(out, *v);
        }
    }
}
