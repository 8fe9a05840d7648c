//! Blob store collaborator.
//!
//! Asset bytes and bulk exports never pass through the sync service. The
//! blob store holds them and hands out time-limited signed URLs.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use serde::Serialize;
use thiserror::Error;

use deckhub_core::CollectionId;

/// Errors from a blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The backend cannot be reached right now.
    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// A time-limited URL for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    /// Unix ms after which the URL stops working.
    pub expires_at: i64,
}

/// Object storage with signed URL issuance.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object under `key`, replacing any previous one.
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    /// Issue a URL for `key` valid for `ttl` from `now` (Unix ms).
    async fn signed_url(&self, key: &str, ttl: Duration, now: i64) -> Result<SignedUrl, BlobError>;
}

/// Storage key of a media asset: `{prefix}/{collection}/{name}`.
pub fn media_key(prefix: &str, collection: &CollectionId, name: &str) -> String {
    format!("{}/{}/{}", prefix, collection, name)
}

/// In-memory blob store signing URLs with a keyed Blake3 MAC.
pub struct MemoryBlobStore {
    base_url: String,
    signing_key: [u8; 32],
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create a store serving URLs under `base_url`, with a random signing key.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut signing_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut signing_key);
        Self::with_key(base_url, signing_key)
    }

    /// Create a store with a fixed signing key.
    pub fn with_key(base_url: impl Into<String>, signing_key: [u8; 32]) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signing_key,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a stored object.
    pub fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let objects = self
            .objects
            .read()
            .map_err(|e| BlobError::Unavailable(format!("lock poisoned: {}", e)))?;
        Ok(objects.get(key).cloned())
    }

    /// Check a signature produced by [`BlobStore::signed_url`].
    pub fn verify(&self, key: &str, expires_at: i64, signature: &str, now: i64) -> bool {
        now <= expires_at && self.sign(key, expires_at).to_hex().as_str() == signature
    }

    fn sign(&self, key: &str, expires_at: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.signing_key);
        hasher.update(key.as_bytes());
        hasher.update(&expires_at.to_be_bytes());
        hasher.finalize()
    }
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        validate_key(key)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|e| BlobError::Unavailable(format!("lock poisoned: {}", e)))?;
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn signed_url(
        &self,
        key: &str,
        ttl: Duration,
        now: i64,
    ) -> Result<SignedUrl, BlobError> {
        validate_key(key)?;
        let expires_at = now.saturating_add(ttl.as_millis() as i64);
        let signature = self.sign(key, expires_at);
        Ok(SignedUrl {
            url: format!(
                "{}/{}?expires={}&signature={}",
                self.base_url,
                key,
                expires_at,
                signature.to_hex()
            ),
            expires_at,
        })
    }
}
