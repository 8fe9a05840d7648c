//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a service over an in-memory
//! store with one collection and helpers to mint credentials and content.

use std::sync::Arc;

use deckhub::{MemoryBlobStore, ServiceConfig, SyncService};
use deckhub_core::{CollectionId, EntityDraft, EntityRecord, RecordTypeId, Revision, SubjectId};
use deckhub_perms::{AccessGrant, MemoryEntitlements, Relation, StaticIdentity};
use deckhub_store::{MemoryStore, Store};

/// Record type used by fixture content.
pub const NOTE_TYPE: RecordTypeId = RecordTypeId(1);

/// A sync service with one collection and in-memory collaborators.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub identity: Arc<StaticIdentity>,
    pub entitlements: Arc<MemoryEntitlements>,
    pub blobs: Arc<MemoryBlobStore>,
    pub service: SyncService<MemoryStore>,
    pub collection: CollectionId,
    next_key: std::sync::atomic::AtomicI64,
}

impl TestFixture {
    /// Create a fixture with the default service configuration.
    pub async fn new() -> Self {
        Self::with_config(ServiceConfig::default()).await
    }

    pub async fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let collection = CollectionId::new();
        store
            .create_collection(&collection, "fixture", 0)
            .await
            .expect("memory store accepts collections");

        let identity = Arc::new(StaticIdentity::new());
        let entitlements = Arc::new(MemoryEntitlements::new());
        let blobs = Arc::new(MemoryBlobStore::with_key("https://blobs.test", [42u8; 32]));
        let service = SyncService::new(
            store.clone(),
            identity.clone(),
            entitlements.clone(),
            blobs.clone(),
            config,
        );

        Self {
            store,
            identity,
            entitlements,
            blobs,
            service,
            collection,
            next_key: std::sync::atomic::AtomicI64::new(1),
        }
    }

    /// Issue a token for `name`, granting `relation` on the collection.
    pub fn token(&self, name: &str, relation: Relation) -> String {
        let subject = SubjectId::new(name);
        self.entitlements
            .grant(AccessGrant::new(subject.clone(), self.collection, relation))
            .expect("grant");
        self.identity.issue(subject).expect("issue token")
    }

    /// Issue a token for a subject with no grants at all.
    pub fn stranger(&self, name: &str) -> String {
        self.identity
            .issue(SubjectId::new(name))
            .expect("issue token")
    }

    /// Write a fresh note with a `Front` field at `at`.
    pub async fn note(&self, front: &str, at: Revision) -> EntityRecord {
        let key = self
            .next_key
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.store
            .upsert_entity(
                &self.collection,
                EntityDraft::new(key, NOTE_TYPE).field("Front", front),
                at,
            )
            .await
            .expect("memory store accepts entities")
    }

    /// Write `count` fresh notes in one batch, so they share a revision.
    pub async fn notes_together(&self, count: usize, at: Revision) -> Vec<EntityRecord> {
        let drafts = (0..count)
            .map(|i| {
                let key = self
                    .next_key
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                EntityDraft::new(key, NOTE_TYPE).field("Front", format!("batch note {}", i))
            })
            .collect();
        self.store
            .upsert_entities(&self.collection, drafts, at)
            .await
            .expect("memory store accepts entities")
    }

    /// Write one note per requested time, in order.
    pub async fn notes_at(&self, revisions: &[Revision]) -> Vec<EntityRecord> {
        let mut out = Vec::with_capacity(revisions.len());
        for (i, at) in revisions.iter().enumerate() {
            out.push(self.note(&format!("note {}", i), *at).await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhub::UpdatesQuery;

    #[tokio::test]
    async fn test_fixture_serves_pages() {
        let fixture = TestFixture::new().await;
        let token = fixture.token("alice", Relation::Reader);
        let written = fixture.notes_at(&[10, 20]).await;

        let page = fixture
            .service
            .collection_updates(&token, &fixture.collection, &UpdatesQuery::default())
            .await
            .unwrap();
        assert_eq!(page.decode_records().unwrap(), written);
    }

    #[tokio::test]
    async fn test_stranger_is_refused() {
        let fixture = TestFixture::new().await;
        let token = fixture.stranger("mallory");
        let err = fixture
            .service
            .collection_updates(&token, &fixture.collection, &UpdatesQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), deckhub::ErrorKind::Unauthorized);
    }
}
