//! Bit-letter codec.
//!
//! Each byte is written as eight ASCII letters, most significant bit first:
//! `Z` for a set bit and `z` for a clear one.

use thiserror::Error;

/// Letter used for a 1 bit.
pub const ONE: u8 = b'Z';
/// Letter used for a 0 bit.
pub const ZERO: u8 = b'z';

/// Encoded letters per decoded byte.
pub const BITS_PER_BYTE: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid character 0x{found:02X} at offset {offset}")]
    InvalidCharacter { offset: usize, found: u8 },

    #[error("encoded length {0} is not a multiple of 8")]
    Length(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Encode one byte as eight letters.
pub fn encode_byte(byte: u8) -> [u8; BITS_PER_BYTE] {
    let mut out = [ZERO; BITS_PER_BYTE];
    for (i, letter) in out.iter_mut().enumerate() {
        if byte & (0x80 >> i) != 0 {
            *letter = ONE;
        }
    }
    out
}

/// Encode a byte sequence.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * BITS_PER_BYTE);
    for &byte in data {
        out.extend_from_slice(&encode_byte(byte));
    }
    out
}

/// Fold eight letters into one byte.
///
/// Only the first eight letters of `encoded` are read; a shorter slice is a
/// length error.
pub fn decode_byte(encoded: &[u8]) -> Result<u8> {
    if encoded.len() < BITS_PER_BYTE {
        return Err(CodecError::Length(encoded.len()));
    }
    decode_byte_at(&encoded[..BITS_PER_BYTE], 0)
}

fn decode_byte_at(letters: &[u8], base: usize) -> Result<u8> {
    let mut value = 0u8;
    for (i, &letter) in letters.iter().enumerate() {
        value <<= 1;
        match letter {
            ONE => value |= 1,
            ZERO => {}
            found => {
                return Err(CodecError::InvalidCharacter {
                    offset: base + i,
                    found,
                })
            }
        }
    }
    Ok(value)
}

/// Decode a whole encoded buffer, failing on the first invalid letter.
pub fn decode(encoded: &[u8]) -> Result<Vec<u8>> {
    if encoded.len() % BITS_PER_BYTE != 0 {
        return Err(CodecError::Length(encoded.len()));
    }
    let mut out = Vec::with_capacity(encoded.len() / BITS_PER_BYTE);
    decode_into(encoded, &mut out)?;
    Ok(out)
}

/// Decode into an existing buffer, appending. On error nothing past the
/// last good byte is appended.
pub fn decode_into(encoded: &[u8], out: &mut Vec<u8>) -> Result<()> {
    if encoded.len() % BITS_PER_BYTE != 0 {
        return Err(CodecError::Length(encoded.len()));
    }
    for (i, chunk) in encoded.chunks_exact(BITS_PER_BYTE).enumerate() {
        out.push(decode_byte_at(chunk, i * BITS_PER_BYTE)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_byte() {
        assert_eq!(&encode_byte(0x5A), b"zZzZZzZz");
        assert_eq!(&encode_byte(0x00), b"zzzzzzzz");
        assert_eq!(&encode_byte(0xFF), b"ZZZZZZZZ");
    }

    #[test]
    fn test_magic_encoding() {
        // "Zz" little-endian as stored in the image header.
        assert_eq!(encode(&0x7a5au16.to_le_bytes()), b"zZzZZzZzzZZZZzZz".to_vec());
    }

    #[test]
    fn test_roundtrip_all_bytes() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn test_any_corrupted_letter_fails() {
        let encoded = encode(&[0x12, 0x34, 0xAB]);
        for offset in 0..encoded.len() {
            let mut corrupted = encoded.clone();
            corrupted[offset] = b'x';
            assert_eq!(
                decode(&corrupted),
                Err(CodecError::InvalidCharacter {
                    offset,
                    found: b'x'
                })
            );
        }
    }

    #[test]
    fn test_bad_length() {
        assert_eq!(decode(b"ZZZ"), Err(CodecError::Length(3)));
        assert_eq!(decode_byte(b"Zz"), Err(CodecError::Length(2)));
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(b"").unwrap(), Vec::<u8>::new());
    }
}
