//! Media records: metadata for binary assets attached to a collection.
//!
//! The sync core never handles asset bytes. It only tracks a content hash
//! so clients can skip downloads whose bytes they already hold.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cursor::{Paged, Position};
use crate::types::Revision;

/// A 32-byte Blake3 hash of an asset's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Hash the given bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Sync-visible state of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Unique within the collection; also the tie-break key.
    pub name: String,
    pub content_hash: ContentHash,
    /// Advances on every upsert that changes state, and on deletion.
    pub modified_at: Revision,
    /// False once the asset has been deleted.
    pub exists: bool,
    /// Staging gate for byte-level access, independent of existence.
    pub download_enabled: bool,
}

impl Paged for MediaRecord {
    fn position(&self) -> Position {
        Position::new(self.modified_at, self.name.clone())
    }
}

/// Outcome of recording an upload against the media index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaUpsert {
    /// No asset with this name existed.
    Created,
    /// The bytes differ from the stored asset (or it had been deleted).
    Replaced,
    /// Byte-identical re-upload; nothing changed.
    Unchanged,
}
