//! Error types for Deckhub core.

use thiserror::Error;

/// Errors from the payload codec.
///
/// A codec error always fails the whole payload; there is no partial output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compress(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("invalid symbol {symbol:?} at offset {offset}")]
    InvalidSymbol { symbol: char, offset: usize },

    #[error("encoded length {0} cannot come from any byte sequence")]
    InvalidLength(usize),

    #[error("group at offset {offset} exceeds 32 bits")]
    Overflow { offset: usize },

    #[error("json error: {0}")]
    Json(String),
}

/// Errors from parsing or resolving a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("malformed cursor: {0}")]
    Malformed(&'static str),

    #[error("unsupported cursor version: {0}")]
    UnsupportedVersion(u8),

    #[error("cursor was not issued for this stream")]
    WrongStream,

    #[error("cursor key must be 64 hex characters")]
    InvalidKey,
}

/// Request validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("page size {requested} is outside 1..={max}")]
    PageSize { requested: i64, max: usize },

    #[error("invalid cursor: {0}")]
    Cursor(#[from] CursorError),

    #[error("invalid identifier: {0}")]
    Identifier(String),
}
