//! Identity: turning a bearer credential into a subject.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::RngCore;

use deckhub_core::SubjectId;

use crate::error::{AccessError, Result};

/// Validates bearer credentials.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Resolve a bearer token to the subject it was issued to.
    async fn authenticate(&self, token: &str) -> Result<SubjectId>;
}

/// In-process identity provider with issued tokens.
///
/// Only Blake3 hashes of tokens are kept.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: RwLock<HashMap<[u8; 32], SubjectId>>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh random token for `subject`.
    pub fn issue(&self, subject: SubjectId) -> Result<String> {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token = hex::encode(raw);
        self.register(&token, subject)?;
        Ok(token)
    }

    /// Accept a known token for `subject`.
    pub fn register(&self, token: &str, subject: SubjectId) -> Result<()> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|e| AccessError::Backend(format!("lock poisoned: {}", e)))?;
        tokens.insert(token_digest(token), subject);
        Ok(())
    }

    /// Stop accepting a token. Returns false if it was unknown.
    pub fn revoke(&self, token: &str) -> Result<bool> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|e| AccessError::Backend(format!("lock poisoned: {}", e)))?;
        Ok(tokens.remove(&token_digest(token)).is_some())
    }
}

fn token_digest(token: &str) -> [u8; 32] {
    *blake3::hash(token.as_bytes()).as_bytes()
}

#[async_trait]
impl Identity for StaticIdentity {
    async fn authenticate(&self, token: &str) -> Result<SubjectId> {
        if token.trim().is_empty() {
            return Err(AccessError::Unauthenticated("missing credential".into()));
        }
        let tokens = self
            .tokens
            .read()
            .map_err(|e| AccessError::Backend(format!("lock poisoned: {}", e)))?;
        tokens
            .get(&token_digest(token))
            .cloned()
            .ok_or_else(|| AccessError::Unauthenticated("unknown credential".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_authenticate() {
        let identity = StaticIdentity::new();
        let token = identity.issue(SubjectId::new("alice")).unwrap();
        assert_eq!(token.len(), 64);

        let subject = identity.authenticate(&token).await.unwrap();
        assert_eq!(subject, SubjectId::new("alice"));
    }

    #[tokio::test]
    async fn test_unknown_and_revoked_tokens() {
        let identity = StaticIdentity::new();
        identity.register("t0k3n", SubjectId::new("bob")).unwrap();

        assert!(matches!(
            identity.authenticate("other").await,
            Err(AccessError::Unauthenticated(_))
        ));
        assert!(matches!(
            identity.authenticate("").await,
            Err(AccessError::Unauthenticated(_))
        ));

        assert!(identity.revoke("t0k3n").unwrap());
        assert!(identity.authenticate("t0k3n").await.is_err());
    }
}
