//! MPQ hashing and block-cipher primitives.
//!
//! MPQ archives locate files through a hash table rather than a
//! directory: every lookup computes three hashes of the file name (a
//! table offset plus two 32-bit check values), and the hash and block
//! tables themselves are stored encrypted with keys derived from the
//! literal strings `"(hash table)"` and `"(block table)"`.
//!
//! All routines share one 0x500-entry table of pseudo-random u32 values
//! generated from the fixed seed `0x0010_0000`. The cipher is a simple
//! stream cipher over little-endian u32 words; `encrypt` is provided as
//! the exact inverse of `decrypt` so that tooling (and the test fixture
//! builder) can produce valid archives.
//!
//! # Example
//!
//! ```
//! use zc_parser::archive::crypt::{decrypt, encrypt, hash_string, HashType};
//!
//! let key = hash_string("(hash table)", HashType::TableKey);
//! let plain = vec![0xDEAD_BEEF, 0x0000_0042];
//! let cipher = encrypt(&plain, key);
//! assert_eq!(decrypt(&cipher, key), plain);
//! ```

use std::sync::OnceLock;

/// The number of entries in the shared crypt table.
const CRYPT_TABLE_LEN: usize = 0x500;

/// The fixed seed the crypt table is generated from.
const CRYPT_TABLE_SEED: u32 = 0x0010_0000;

/// The hash family selector.
///
/// Each file-name lookup uses `TableOffset` to pick a starting slot and
/// `NameA`/`NameB` as the 64 bits of check value stored in the slot.
/// `TableKey` derives decryption keys for the hash/block tables and for
/// encrypted files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    /// Starting slot index into the hash table.
    TableOffset,
    /// First stored check hash.
    NameA,
    /// Second stored check hash.
    NameB,
    /// Encryption key derivation.
    TableKey,
}

impl HashType {
    /// Returns the crypt-table bank this hash family reads from.
    #[must_use]
    fn bank(self) -> u32 {
        match self {
            HashType::TableOffset => 0,
            HashType::NameA => 1,
            HashType::NameB => 2,
            HashType::TableKey => 3,
        }
    }
}

/// Returns the shared crypt table, generating it on first use.
fn crypt_table() -> &'static [u32; CRYPT_TABLE_LEN] {
    static TABLE: OnceLock<[u32; CRYPT_TABLE_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; CRYPT_TABLE_LEN];
        let mut seed = CRYPT_TABLE_SEED;

        for index1 in 0..0x100 {
            for i in 0..5 {
                seed = (seed.wrapping_mul(125).wrapping_add(3)) % 0x2A_AAAB;
                let temp1 = (seed & 0xFFFF) << 16;

                seed = (seed.wrapping_mul(125).wrapping_add(3)) % 0x2A_AAAB;
                let temp2 = seed & 0xFFFF;

                table[index1 + i * 0x100] = temp1 | temp2;
            }
        }

        table
    })
}

/// Hashes a file name with the given hash family.
///
/// Names are case-insensitive and use `\` as the path separator; both
/// normalizations are applied here so callers can pass names verbatim.
///
/// # Example
///
/// ```
/// use zc_parser::archive::crypt::{hash_string, HashType};
///
/// // Hashing is case-insensitive
/// assert_eq!(
///     hash_string("replay.details", HashType::NameA),
///     hash_string("REPLAY.DETAILS", HashType::NameA),
/// );
/// ```
#[must_use]
pub fn hash_string(name: &str, hash_type: HashType) -> u32 {
    let table = crypt_table();
    let bank = hash_type.bank();

    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for byte in name.bytes() {
        let ch = match byte {
            b'/' => b'\\',
            b'a'..=b'z' => byte.to_ascii_uppercase(),
            _ => byte,
        };
        let value = table[((bank << 8) + u32::from(ch)) as usize];
        seed1 = value ^ seed1.wrapping_add(seed2);
        seed2 = u32::from(ch)
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Decrypts a sequence of u32 words with the given key.
#[must_use]
pub fn decrypt(words: &[u32], key: u32) -> Vec<u32> {
    let table = crypt_table();

    let mut seed1 = key;
    let mut seed2: u32 = 0xEEEE_EEEE;
    let mut output = Vec::with_capacity(words.len());

    for &word in words {
        seed2 = seed2.wrapping_add(table[(0x400 + (seed1 & 0xFF)) as usize]);
        let plain = word ^ seed1.wrapping_add(seed2);

        seed1 = ((!seed1 << 0x15).wrapping_add(0x1111_1111)) | (seed1 >> 0x0B);
        seed2 = plain
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);

        output.push(plain);
    }

    output
}

/// Encrypts a sequence of u32 words with the given key.
///
/// Exact inverse of [`decrypt`]; the seed schedule consumes the
/// plaintext word, so the two directions differ only in which value is
/// fed back.
#[must_use]
pub fn encrypt(words: &[u32], key: u32) -> Vec<u32> {
    let table = crypt_table();

    let mut seed1 = key;
    let mut seed2: u32 = 0xEEEE_EEEE;
    let mut output = Vec::with_capacity(words.len());

    for &plain in words {
        seed2 = seed2.wrapping_add(table[(0x400 + (seed1 & 0xFF)) as usize]);
        let cipher = plain ^ seed1.wrapping_add(seed2);

        seed1 = ((!seed1 << 0x15).wrapping_add(0x1111_1111)) | (seed1 >> 0x0B);
        seed2 = plain
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);

        output.push(cipher);
    }

    output
}

/// Converts a little-endian byte buffer into u32 words.
///
/// The buffer length must be a multiple of 4; trailing bytes would be
/// silently dropped otherwise, which always indicates a corrupt table.
#[must_use]
pub fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Converts u32 words back into a little-endian byte buffer.
#[must_use]
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}
