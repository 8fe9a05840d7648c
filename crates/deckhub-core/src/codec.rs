//! Payload codec: gzip, then an 85-symbol printable encoding.
//!
//! Pages of records travel through a text-only channel. The codec
//! compresses the payload and then maps every 4-byte group to 5 symbols
//! drawn from a fixed 85-character alphabet (the RFC 1924 ordering).
//!
//! A trailing partial group of `n` bytes (1..=3) is zero-padded to 4 bytes
//! and only its first `n + 1` symbols are emitted. The decoder pads such a
//! tail with the highest symbol before decoding and drops the padding bytes
//! again, so the original length is recovered without a length field.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// The 85-symbol alphabet, in value order.
pub const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

const PAD_SYMBOL: u8 = 84;

/// Symbol value lookup; 0xff marks bytes outside the alphabet.
const DECODE_TABLE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [0xffu8; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Compress and encode a payload.
pub fn encode(data: &[u8]) -> Result<String, CodecError> {
    let compressed = compress(data)?;
    Ok(encode_base85(&compressed))
}

/// Decode and decompress a payload produced by [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    let compressed = decode_base85(text)?;
    decompress(&compressed)
}

/// Serialize a value as JSON and encode it.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value).map_err(|e| CodecError::Json(e.to_string()))?;
    encode(&json)
}

/// Decode a payload and parse it as JSON.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    let json = decode(text)?;
    serde_json::from_slice(&json).map_err(|e| CodecError::Json(e.to_string()))
}

fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CodecError::Compress(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Compress(e.to_string()))
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;
    Ok(out)
}

/// Encode raw bytes with the 85-symbol alphabet (no compression).
pub fn encode_base85(data: &[u8]) -> String {
    let mut out = Vec::with_capacity(data.len().div_ceil(4) * 5);

    for chunk in data.chunks(4) {
        let mut group = [0u8; 4];
        group[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(group);

        let mut symbols = [0u8; 5];
        for slot in symbols.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        out.extend_from_slice(&symbols[..chunk.len() + 1]);
    }

    // Every symbol is ASCII.
    out.into_iter().map(char::from).collect()
}

/// Decode text produced by [`encode_base85`].
pub fn decode_base85(text: &str) -> Result<Vec<u8>, CodecError> {
    let bytes = text.as_bytes();
    if bytes.len() % 5 == 1 {
        return Err(CodecError::InvalidLength(bytes.len()));
    }

    let mut out = Vec::with_capacity(bytes.len() / 5 * 4 + 3);

    for (group_index, chunk) in bytes.chunks(5).enumerate() {
        let mut value: u64 = 0;
        for i in 0..5 {
            let digit = match chunk.get(i) {
                Some(&symbol) => {
                    let digit = DECODE_TABLE[symbol as usize];
                    if digit == 0xff {
                        return Err(CodecError::InvalidSymbol {
                            symbol: char::from(symbol),
                            offset: group_index * 5 + i,
                        });
                    }
                    digit
                }
                None => PAD_SYMBOL,
            };
            value = value * 85 + u64::from(digit);
        }

        let value = u32::try_from(value).map_err(|_| CodecError::Overflow {
            offset: group_index * 5,
        })?;
        out.extend_from_slice(&value.to_be_bytes()[..chunk.len() - 1]);
    }

    Ok(out)
}
