//! Entitlements: where a subject's grants come from.

use std::sync::RwLock;

use async_trait::async_trait;

use deckhub_core::{CollectionId, SubjectId};

use crate::error::{AccessError, Result};
use crate::grant::{AccessGrant, Relation};
use crate::state::GrantSet;

/// Source of access grants.
#[async_trait]
pub trait Entitlement: Send + Sync {
    /// All grants `subject` holds on `collection`, active or not.
    async fn grants_for(
        &self,
        subject: &SubjectId,
        collection: &CollectionId,
    ) -> Result<Vec<AccessGrant>>;
}

/// In-memory entitlement source.
#[derive(Default)]
pub struct MemoryEntitlements {
    grants: RwLock<GrantSet>,
}

impl MemoryEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant.
    pub fn grant(&self, grant: AccessGrant) -> Result<()> {
        self.grants
            .write()
            .map_err(|e| AccessError::Backend(format!("lock poisoned: {}", e)))?
            .add(grant);
        Ok(())
    }

    /// Revoke a relation at `at`. Returns how many grants were revoked.
    pub fn revoke(
        &self,
        subject: &SubjectId,
        collection: &CollectionId,
        relation: Relation,
        at: i64,
    ) -> Result<usize> {
        Ok(self
            .grants
            .write()
            .map_err(|e| AccessError::Backend(format!("lock poisoned: {}", e)))?
            .revoke(subject, collection, relation, at))
    }
}

#[async_trait]
impl Entitlement for MemoryEntitlements {
    async fn grants_for(
        &self,
        subject: &SubjectId,
        collection: &CollectionId,
    ) -> Result<Vec<AccessGrant>> {
        let grants = self
            .grants
            .read()
            .map_err(|e| AccessError::Backend(format!("lock poisoned: {}", e)))?;
        Ok(grants.grants_for(subject, collection).to_vec())
    }
}
