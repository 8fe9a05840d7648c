//! Sync cursors: opaque markers of how far a client has synced.
//!
//! Internally a cursor is a [`Position`] (revision timestamp plus tie-break
//! key) bound to the stream it was issued for. At the boundary it is an
//! opaque hex token; callers only ever echo back what the server issued.
//!
//! Token layout (before hex encoding):
//!
//! ```text
//! version (1) || mac (32) || revision, i64 BE (8) || key, UTF-8 (rest)
//! ```
//!
//! The mac is a keyed Blake3 hash over the stream and the position under a
//! server [`CursorKey`]. A token whose mac does not verify, whether edited,
//! minted by a client, or issued for another stream, is rejected.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::CursorError;
use crate::types::{CollectionId, OverlayId, Revision};

/// Current cursor token version.
pub const CURSOR_VERSION: u8 = 1;

const MAC_LEN: usize = 32;
const HEADER_LEN: usize = 1 + MAC_LEN + 8;

/// A point in a change log: everything at or before it has been delivered.
///
/// Ordered by revision, then by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub revision: Revision,
    pub key: String,
}

impl Position {
    pub fn new(revision: Revision, key: impl Into<String>) -> Self {
        Self {
            revision,
            key: key.into(),
        }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.revision
            .cmp(&other.revision)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Anything that lives in a paginated change log.
pub trait Paged {
    /// The item's position in its log.
    fn position(&self) -> Position;
}

/// The change log a cursor belongs to. Each scope is its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamScope {
    /// Entity records of a collection.
    Entities(CollectionId),
    /// Media records of a collection.
    Media(CollectionId),
    /// Assignments of an extension overlay.
    Assignments(OverlayId),
}

impl StreamScope {
    fn feed(&self, hasher: &mut blake3::Hasher) {
        match self {
            StreamScope::Entities(id) => {
                hasher.update(b"entities:");
                hasher.update(id.as_bytes());
            }
            StreamScope::Media(id) => {
                hasher.update(b"media:");
                hasher.update(id.as_bytes());
            }
            StreamScope::Assignments(id) => {
                hasher.update(b"assignments:");
                hasher.update(&id.0.to_be_bytes());
            }
        }
    }
}

/// Server secret that authenticates issued cursors.
///
/// Cursors stay valid for as long as the key does, so a deployment keeps
/// one key across restarts.
#[derive(Clone)]
pub struct CursorKey([u8; 32]);

impl CursorKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// A fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse a key from 64 hex characters.
    pub fn from_hex(hex_key: &str) -> Result<Self, CursorError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|_| CursorError::InvalidKey)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| CursorError::InvalidKey)?;
        Ok(Self(bytes))
    }

    fn mac(&self, scope: &StreamScope, position: &Position) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.0);
        hasher.update(b"deckhub-cursor-v1:");
        scope.feed(&mut hasher);
        hasher.update(&position.revision.to_be_bytes());
        hasher.update(position.key.as_bytes());
        hasher.finalize()
    }
}

impl fmt::Debug for CursorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CursorKey(..)")
    }
}

/// An opaque sync cursor.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    mac: [u8; MAC_LEN],
    position: Position,
}

impl Cursor {
    /// Issue a cursor for a position in the given stream.
    pub fn issue(key: &CursorKey, scope: &StreamScope, position: Position) -> Self {
        Self {
            mac: *key.mac(scope, &position).as_bytes(),
            position,
        }
    }

    /// Resolve the cursor against the stream it is presented for.
    ///
    /// Fails unless `key` issued this exact cursor for `scope`.
    pub fn resolve(&self, key: &CursorKey, scope: &StreamScope) -> Result<&Position, CursorError> {
        // blake3::Hash compares in constant time.
        if key.mac(scope, &self.position) != blake3::Hash::from(self.mac) {
            return Err(CursorError::WrongStream);
        }
        Ok(&self.position)
    }

    /// The position this cursor marks.
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Revision timestamp of the last delivered item.
    pub fn revision(&self) -> Revision {
        self.position.revision
    }

    /// Encode to the opaque token form.
    pub fn to_token(&self) -> String {
        let key = self.position.key.as_bytes();
        let mut buf = Vec::with_capacity(HEADER_LEN + key.len());
        buf.push(CURSOR_VERSION);
        buf.extend_from_slice(&self.mac);
        buf.extend_from_slice(&self.position.revision.to_be_bytes());
        buf.extend_from_slice(key);
        hex::encode(buf)
    }

    /// Parse an opaque token.
    pub fn from_token(token: &str) -> Result<Self, CursorError> {
        let bytes = hex::decode(token).map_err(|_| CursorError::Malformed("not hex"))?;
        if bytes.len() < HEADER_LEN {
            return Err(CursorError::Malformed("too short"));
        }
        if bytes[0] != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(bytes[0]));
        }

        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&bytes[1..1 + MAC_LEN]);
        let mut revision = [0u8; 8];
        revision.copy_from_slice(&bytes[1 + MAC_LEN..HEADER_LEN]);
        let key = String::from_utf8(bytes[HEADER_LEN..].to_vec())
            .map_err(|_| CursorError::Malformed("key is not UTF-8"))?;

        Ok(Self {
            mac,
            position: Position::new(i64::from_be_bytes(revision), key),
        })
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cursor({}, {:?})",
            self.position.revision, self.position.key
        )
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

impl FromStr for Cursor {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cursor::from_token(s)
    }
}

impl Serialize for Cursor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_token())
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cursor::from_token(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CursorKey {
        CursorKey::new([7u8; 32])
    }

    #[test]
    fn test_token_roundtrip() {
        let scope = StreamScope::Entities(CollectionId::new());
        let cursor = Cursor::issue(&key(), &scope, Position::new(1_700_000_000_000, "abc"));
        let parsed: Cursor = cursor.to_token().parse().unwrap();
        assert_eq!(parsed, cursor);
        assert_eq!(
            parsed.resolve(&key(), &scope).unwrap().revision,
            1_700_000_000_000
        );
    }

    #[test]
    fn test_cursor_bound_to_stream() {
        let collection = CollectionId::new();
        let cursor = Cursor::issue(
            &key(),
            &StreamScope::Entities(collection),
            Position::new(5, "k"),
        );

        assert_eq!(
            cursor.resolve(&key(), &StreamScope::Media(collection)),
            Err(CursorError::WrongStream)
        );
        assert_eq!(
            cursor.resolve(&key(), &StreamScope::Entities(CollectionId::new())),
            Err(CursorError::WrongStream)
        );
        assert_eq!(
            cursor.resolve(&key(), &StreamScope::Assignments(OverlayId(1))),
            Err(CursorError::WrongStream)
        );
    }

    #[test]
    fn test_edited_or_minted_tokens_rejected() {
        let scope = StreamScope::Entities(CollectionId::new());
        let issued = Cursor::issue(&key(), &scope, Position::new(500, "m"));

        // Issued mac, edited revision.
        let mut bytes = hex::decode(issued.to_token()).unwrap();
        bytes[1 + MAC_LEN + 7] ^= 0x01;
        let edited = Cursor::from_token(&hex::encode(bytes)).unwrap();
        assert_eq!(edited.resolve(&key(), &scope), Err(CursorError::WrongStream));

        // Minted under a key the server does not hold.
        let minted = Cursor::issue(&CursorKey::new([8u8; 32]), &scope, Position::new(0, ""));
        assert_eq!(minted.resolve(&key(), &scope), Err(CursorError::WrongStream));
    }

    #[test]
    fn test_cursor_key_from_hex() {
        let hex_key = "07".repeat(32);
        let parsed = CursorKey::from_hex(&hex_key).unwrap();
        let scope = StreamScope::Media(CollectionId::new());
        let cursor = Cursor::issue(&key(), &scope, Position::new(1, "a"));
        assert!(cursor.resolve(&parsed, &scope).is_ok());

        assert_eq!(CursorKey::from_hex("abcd").unwrap_err(), CursorError::InvalidKey);
        assert_eq!(CursorKey::from_hex("zz").unwrap_err(), CursorError::InvalidKey);
        assert_eq!(format!("{:?}", parsed), "CursorKey(..)");
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(matches!(
            Cursor::from_token("zz"),
            Err(CursorError::Malformed(_))
        ));
        assert!(matches!(
            Cursor::from_token("01ab"),
            Err(CursorError::Malformed(_))
        ));

        let scope = StreamScope::Media(CollectionId::new());
        let mut token = Cursor::issue(&key(), &scope, Position::new(1, "a")).to_token();
        token.replace_range(0..2, "09");
        assert_eq!(
            Cursor::from_token(&token),
            Err(CursorError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_negative_revision_survives() {
        let scope = StreamScope::Assignments(OverlayId(3));
        let cursor = Cursor::issue(&key(), &scope, Position::new(-42, ""));
        let parsed = Cursor::from_token(&cursor.to_token()).unwrap();
        assert_eq!(parsed.revision(), -42);
        assert!(parsed.resolve(&key(), &scope).is_ok());
    }

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(1, "b") < Position::new(2, "a"));
        assert!(Position::new(2, "a") < Position::new(2, "b"));
    }
}
