//! Golden vectors for the 85-symbol encoding.
//!
//! Clients in other languages decode the same payloads, so the raw
//! encoding is pinned here byte for byte. Gzip output is not pinned: only
//! its round trip is.

use deckhub_core::codec::{decode_base85, encode_base85};

/// A known input and its expected encoding.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub input: &'static [u8],
    /// Expected encoding of `input`.
    pub encoded: &'static str,
}

/// All golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "empty",
            input: b"",
            encoded: "",
        },
        GoldenVector {
            name: "single byte",
            input: b"a",
            encoded: "VE",
        },
        GoldenVector {
            name: "three bytes",
            input: b"abc",
            encoded: "VPaz",
        },
        GoldenVector {
            name: "one full group",
            input: b"abcd",
            encoded: "VPa!s",
        },
        GoldenVector {
            name: "group plus one",
            input: b"abcde",
            encoded: "VPa!sWd",
        },
        GoldenVector {
            name: "ascii text",
            input: b"hello world",
            encoded: "Xk~0{Zy<MXa%^M",
        },
        GoldenVector {
            name: "all zero group",
            input: &[0, 0, 0, 0],
            encoded: "00000",
        },
        GoldenVector {
            name: "all ones group",
            input: &[0xff, 0xff, 0xff, 0xff],
            encoded: "|NsC0",
        },
        GoldenVector {
            name: "utf-8 kanji",
            input: "猫".as_bytes(),
            encoded: "=Zvc",
        },
    ]
}

/// Check every vector in both directions.
///
/// Returns `(name, matches, actual encoding)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let encoded = encode_base85(v.input);
            let decodes = decode_base85(v.encoded).is_ok_and(|bytes| bytes == v.input);
            (v.name.to_string(), encoded == v.encoded && decodes, encoded)
        })
        .collect()
}
