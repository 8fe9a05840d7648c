//! The sync service: the single entry point of every sync request.
//!
//! Each operation authenticates the bearer credential, makes one access
//! decision for the requested resource, and only then runs the sync
//! components. Responses are the wire shapes clients consume.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use deckhub_core::{
    codec, now_millis, CollectionId, Cursor, CursorKey, EntityId, EntityRecord, MediaRecord,
    Overlay, OverlayAssignment, OverlayId, PageSize, Paged, PaginationLimits, ProtectionRules,
    RecordTypeId, StreamScope, SubjectId,
};
use deckhub_perms::{check_access, AccessDecision, Entitlement, Identity, Relation, Resource};
use deckhub_store::{ExportSnapshot, Store};
use deckhub_sync::{
    current_protection, get_page, set_protected_fields, set_protected_tags, MediaIndex,
    OverlaySync,
};

use crate::blob::{media_key, BlobStore, SignedUrl};
use crate::error::{Result, ServiceError};

/// Configuration for the sync service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Page size bounds.
    pub limits: PaginationLimits,
    /// Page size used when a request names none.
    pub default_page_size: i64,
    /// Above this many records a first sync is pointed at the bulk export.
    pub full_export_threshold: u64,
    /// Lifetime of issued signed URLs.
    pub signed_url_ttl: Duration,
    /// Storage key prefix of media assets.
    pub media_key_prefix: String,
    /// Secret that authenticates issued cursors.
    pub cursor_key: CursorKey,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: PaginationLimits::default(),
            default_page_size: 500,
            full_export_threshold: 10_000,
            signed_url_ttl: Duration::from_secs(60 * 60),
            media_key_prefix: "deck_assets".to_string(),
            cursor_key: CursorKey::generate(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Query of an entity sync page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatesQuery {
    /// Cursor token from a previous page; absent on first sync.
    pub since: Option<String>,
    pub size: Option<i64>,
    /// Ask for the bulk export on a first sync.
    #[serde(default)]
    pub full: bool,
}

/// Query of a media or assignment page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub since: Option<String>,
    pub size: Option<i64>,
}

/// One page of entity updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatesPage {
    /// Codec-encoded JSON array of entity records.
    pub records: String,
    pub latest_update: Option<Cursor>,
    /// Protected field names by record type id.
    pub protected_fields: BTreeMap<String, Vec<String>>,
    pub protected_tags: Vec<String>,
    pub next: Option<Cursor>,
    /// Signed URL of a bulk export to load before applying `records`.
    pub external_records_url: Option<String>,
}

impl UpdatesPage {
    /// Decode the records payload.
    pub fn decode_records(&self) -> Result<Vec<EntityRecord>> {
        Ok(codec::decode_json(&self.records)?)
    }
}

/// Client view of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub name: String,
    /// Hex-encoded Blake3 digest of the bytes.
    pub content_hash: String,
    pub modified: i64,
    pub exists: bool,
    pub download_enabled: bool,
}

impl From<MediaRecord> for MediaDescriptor {
    fn from(record: MediaRecord) -> Self {
        Self {
            content_hash: record.content_hash.to_hex(),
            name: record.name,
            modified: record.modified_at,
            exists: record.exists,
            download_enabled: record.download_enabled,
        }
    }
}

/// One page of media updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPage {
    pub media: Vec<MediaDescriptor>,
    pub latest_update: Option<Cursor>,
    pub next: Option<Cursor>,
}

/// Tags one overlay assigns to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEntry {
    pub entity: EntityId,
    pub tags: Vec<String>,
}

impl From<OverlayAssignment> for AssignmentEntry {
    fn from(assignment: OverlayAssignment) -> Self {
        Self {
            entity: assignment.entity_id,
            tags: assignment.tags.into_iter().collect(),
        }
    }
}

/// One page of overlay assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentsPage {
    pub assignments: Vec<AssignmentEntry>,
    pub latest_update: Option<Cursor>,
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedFields {
    pub fields: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedTags {
    pub tags: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// The sync service.
///
/// Holds the catalog store and the three external collaborators: identity,
/// entitlements and blob storage. All state lives in those; the service
/// itself keeps none between requests.
pub struct SyncService<S: Store + ?Sized> {
    store: Arc<S>,
    identity: Arc<dyn Identity>,
    entitlements: Arc<dyn Entitlement>,
    blobs: Arc<dyn BlobStore>,
    config: ServiceConfig,
}

impl<S: Store + ?Sized> SyncService<S> {
    pub fn new(
        store: Arc<S>,
        identity: Arc<dyn Identity>,
        entitlements: Arc<dyn Entitlement>,
        blobs: Arc<dyn BlobStore>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            identity,
            entitlements,
            blobs,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entity sync
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of entity updates of a collection.
    ///
    /// The protection rules in force when the page is served ride along. A
    /// first sync of a large collection (or one asking for `full`) is pointed
    /// at the latest bulk export instead, when there is one.
    pub async fn collection_updates(
        &self,
        token: &str,
        collection: &CollectionId,
        query: &UpdatesQuery,
    ) -> Result<UpdatesPage> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Collection(*collection))
            .await?;
        let size = self.page_size(query.size)?;

        let rules = current_protection(self.store.as_ref(), collection).await?;

        if query.since.is_none() {
            if let Some(page) = self.export_pointer(collection, query.full, &rules).await? {
                return Ok(page);
            }
        }

        let page = get_page(
            self.store.as_ref(),
            &self.config.cursor_key,
            collection,
            query.since.as_deref(),
            size,
        )
        .await?;
        let records = codec::encode_json(&page.items)?;

        tracing::debug!(
            collection = %collection,
            subject = %subject,
            count = page.items.len(),
            "served updates"
        );

        Ok(UpdatesPage {
            records,
            latest_update: page.latest,
            protected_fields: rules.fields_wire(),
            protected_tags: rules.tags_wire(),
            next: page.next,
            external_records_url: None,
        })
    }

    async fn export_pointer(
        &self,
        collection: &CollectionId,
        full: bool,
        rules: &ProtectionRules,
    ) -> Result<Option<UpdatesPage>> {
        if !full && self.store.entity_count(collection).await? <= self.config.full_export_threshold
        {
            return Ok(None);
        }
        let Some(snapshot) = self.store.latest_export(collection).await? else {
            return Ok(None);
        };

        let url = self
            .blobs
            .signed_url(&snapshot.storage_key, self.config.signed_url_ttl, now_millis())
            .await?;
        let cursor = Cursor::issue(
            &self.config.cursor_key,
            &StreamScope::Entities(*collection),
            snapshot.position,
        );

        tracing::info!(
            collection = %collection,
            key = %snapshot.storage_key,
            records = snapshot.record_count,
            "pointing first sync at bulk export"
        );

        Ok(Some(UpdatesPage {
            records: codec::encode_json(&Vec::<EntityRecord>::new())?,
            latest_update: Some(cursor.clone()),
            protected_fields: rules.fields_wire(),
            protected_tags: rules.tags_wire(),
            next: Some(cursor),
            external_records_url: Some(url.url),
        }))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Media
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of media index changes.
    pub async fn media_updates(
        &self,
        token: &str,
        collection: &CollectionId,
        query: &PageQuery,
    ) -> Result<MediaPage> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Collection(*collection))
            .await?;
        let size = self.page_size(query.size)?;

        let page = MediaIndex::new(self.store.as_ref())
            .changed_since(&self.config.cursor_key, collection, query.since.as_deref(), size)
            .await?;

        Ok(MediaPage {
            media: page.items.into_iter().map(MediaDescriptor::from).collect(),
            latest_update: page.latest,
            next: page.next,
        })
    }

    /// A signed download URL for one asset.
    ///
    /// Deleted assets are not found; assets whose download gate is closed
    /// are refused.
    pub async fn media_download_url(
        &self,
        token: &str,
        collection: &CollectionId,
        name: &str,
    ) -> Result<SignedUrl> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Collection(*collection))
            .await?;

        let record = MediaIndex::new(self.store.as_ref())
            .get(collection, name)
            .await?
            .filter(|m| m.exists)
            .ok_or_else(|| ServiceError::NotFound(format!("media {}", name)))?;
        if !record.download_enabled {
            return Err(ServiceError::Unauthorized(format!(
                "download of {} is disabled",
                name
            )));
        }

        let key = media_key(&self.config.media_key_prefix, collection, name);
        Ok(self
            .blobs
            .signed_url(&key, self.config.signed_url_ttl, now_millis())
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Extension overlays
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of an overlay's tag assignments.
    pub async fn overlay_assignments(
        &self,
        token: &str,
        overlay: &OverlayId,
        query: &PageQuery,
    ) -> Result<AssignmentsPage> {
        let subject = self.authenticate(token).await?;
        let overlays = OverlaySync::new(self.store.as_ref());
        let definition = overlays.overlay(overlay).await?;
        self.authorize(
            &subject,
            Resource::Overlay {
                id: *overlay,
                collection: definition.collection_id,
            },
        )
        .await?;
        let size = self.page_size(query.size)?;

        let page = overlays
            .assignments_since(&self.config.cursor_key, overlay, query.since.as_deref(), size)
            .await?;

        Ok(AssignmentsPage {
            assignments: page.items.into_iter().map(AssignmentEntry::from).collect(),
            latest_update: page.latest,
            next: page.next,
        })
    }

    /// Overlays of a collection the subject may read.
    ///
    /// Plain readers of the collection get an empty list.
    pub async fn list_overlays(
        &self,
        token: &str,
        collection: &CollectionId,
    ) -> Result<Vec<Overlay>> {
        let subject = self.authenticate(token).await?;
        let relation = self
            .authorize(&subject, Resource::Collection(*collection))
            .await?;
        if !relation.can_read_overlays() {
            return Ok(Vec::new());
        }
        Ok(OverlaySync::new(self.store.as_ref())
            .overlays_for(collection)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Protection
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn protected_fields(
        &self,
        token: &str,
        collection: &CollectionId,
    ) -> Result<ProtectedFields> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Collection(*collection))
            .await?;
        let rules = current_protection(self.store.as_ref(), collection).await?;
        Ok(ProtectedFields {
            fields: rules.fields_wire(),
        })
    }

    pub async fn protected_tags(
        &self,
        token: &str,
        collection: &CollectionId,
    ) -> Result<ProtectedTags> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Collection(*collection))
            .await?;
        let rules = current_protection(self.store.as_ref(), collection).await?;
        Ok(ProtectedTags {
            tags: rules.tags_wire(),
        })
    }

    /// Replace the protected fields of one record type. Maintainers only.
    pub async fn set_protected_fields(
        &self,
        token: &str,
        collection: &CollectionId,
        type_id: RecordTypeId,
        names: Vec<String>,
    ) -> Result<ProtectedFields> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Maintenance(*collection))
            .await?;
        let rules = set_protected_fields(self.store.as_ref(), collection, type_id, names).await?;
        Ok(ProtectedFields {
            fields: rules.fields_wire(),
        })
    }

    /// Replace the protected tags of a collection. Maintainers only.
    pub async fn set_protected_tags(
        &self,
        token: &str,
        collection: &CollectionId,
        names: Vec<String>,
    ) -> Result<ProtectedTags> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Maintenance(*collection))
            .await?;
        let rules = set_protected_tags(self.store.as_ref(), collection, names).await?;
        Ok(ProtectedTags {
            tags: rules.tags_wire(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk export
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the whole entity log to the blob store and record the snapshot.
    ///
    /// Returns `None` for a collection with no records.
    pub async fn publish_export(
        &self,
        token: &str,
        collection: &CollectionId,
    ) -> Result<Option<ExportSnapshot>> {
        let subject = self.authenticate(token).await?;
        self.authorize(&subject, Resource::Maintenance(*collection))
            .await?;

        let size = PageSize::new(self.config.limits.max_page_size as i64, &self.config.limits)?;
        let mut records: Vec<EntityRecord> = Vec::new();
        let mut since: Option<String> = None;
        loop {
            let page = get_page(
                self.store.as_ref(),
                &self.config.cursor_key,
                collection,
                since.as_deref(),
                size,
            )
            .await?;
            records.extend(page.items);
            match page.next {
                Some(next) => since = Some(next.to_token()),
                None => break,
            }
        }

        let Some(last) = records.last() else {
            return Ok(None);
        };
        let position = last.position();
        let storage_key = format!("exports/{}/{}", collection, position.revision);

        let body = codec::encode_json(&records)?;
        self.blobs.put_object(&storage_key, body.into_bytes()).await?;

        let snapshot = ExportSnapshot {
            storage_key,
            position,
            record_count: records.len() as u64,
            created_at: now_millis(),
        };
        self.store.record_export(collection, &snapshot).await?;

        tracing::info!(
            collection = %collection,
            key = %snapshot.storage_key,
            records = snapshot.record_count,
            "published bulk export"
        );
        Ok(Some(snapshot))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────────

    async fn authenticate(&self, token: &str) -> Result<SubjectId> {
        if token.is_empty() {
            return Err(ServiceError::Unauthenticated("missing credential".into()));
        }
        Ok(self.identity.authenticate(token).await?)
    }

    /// The one access decision of a request.
    async fn authorize(&self, subject: &SubjectId, resource: Resource) -> Result<Relation> {
        let collection = resource.collection();
        if !self.store.collection_exists(&collection).await? {
            return Err(ServiceError::NotFound(format!("collection {}", collection)));
        }

        let grants = self.entitlements.grants_for(subject, &collection).await?;
        match check_access(subject, &resource, &grants, now_millis()) {
            AccessDecision::Allowed(relation) => Ok(relation),
            AccessDecision::Denied => {
                tracing::warn!(
                    subject = %subject,
                    resource = ?resource,
                    "access denied"
                );
                Err(ServiceError::Unauthorized(format!(
                    "{} may not access {:?}",
                    subject, resource
                )))
            }
        }
    }

    fn page_size(&self, requested: Option<i64>) -> Result<PageSize> {
        let requested = requested.unwrap_or(self.config.default_page_size);
        Ok(PageSize::new(requested, &self.config.limits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::error::ErrorKind;
    use deckhub_core::{ContentHash, EntityDraft};
    use deckhub_perms::{AccessGrant, MemoryEntitlements, StaticIdentity};
    use deckhub_store::MemoryStore;

    struct Harness {
        service: SyncService<MemoryStore>,
        identity: Arc<StaticIdentity>,
        entitlements: Arc<MemoryEntitlements>,
        blobs: Arc<MemoryBlobStore>,
        collection: CollectionId,
    }

    impl Harness {
        async fn new(config: ServiceConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let collection = CollectionId::new();
            store
                .create_collection(&collection, "Japanese Core", 0)
                .await
                .unwrap();

            let identity = Arc::new(StaticIdentity::new());
            let entitlements = Arc::new(MemoryEntitlements::new());
            let blobs = Arc::new(MemoryBlobStore::with_key("https://cdn.test", [1u8; 32]));
            let service = SyncService::new(
                store,
                identity.clone(),
                entitlements.clone(),
                blobs.clone(),
                config,
            );
            Self {
                service,
                identity,
                entitlements,
                blobs,
                collection,
            }
        }

        fn user(&self, name: &str, relation: Option<Relation>) -> String {
            let subject = SubjectId::new(name);
            if let Some(relation) = relation {
                self.entitlements
                    .grant(AccessGrant::new(subject.clone(), self.collection, relation))
                    .unwrap();
            }
            self.identity.issue(subject).unwrap()
        }

        async fn write(&self, natural_key: i64, at: i64) -> EntityRecord {
            self.service
                .store()
                .upsert_entity(
                    &self.collection,
                    EntityDraft::new(natural_key, RecordTypeId(7)).field("Front", "猫"),
                    at,
                )
                .await
                .unwrap()
        }
    }

    fn query(since: Option<&Cursor>, size: i64) -> UpdatesQuery {
        UpdatesQuery {
            since: since.map(|c| c.to_token()),
            size: Some(size),
            full: false,
        }
    }

    #[tokio::test]
    async fn test_updates_round_trip_through_codec() {
        let h = Harness::new(ServiceConfig::default()).await;
        let token = h.user("alice", Some(Relation::Reader));
        let n1 = h.write(1, 100).await;
        let n2 = h.write(2, 200).await;
        let n3 = h.write(3, 300).await;

        let first = h
            .service
            .collection_updates(&token, &h.collection, &query(None, 2))
            .await
            .unwrap();
        assert_eq!(first.decode_records().unwrap(), vec![n1, n2]);
        let next = first.next.unwrap();
        assert_eq!(next.revision(), 200);

        let second = h
            .service
            .collection_updates(&token, &h.collection, &query(Some(&next), 2))
            .await
            .unwrap();
        assert_eq!(second.decode_records().unwrap(), vec![n3]);
        assert!(second.next.is_none());
        assert!(second.external_records_url.is_none());
    }

    #[tokio::test]
    async fn test_protection_visible_on_next_page() {
        let h = Harness::new(ServiceConfig::default()).await;
        let owner = h.user("owner", Some(Relation::Owner));
        let reader = h.user("reader", Some(Relation::Reader));
        h.write(1, 100).await;

        h.service
            .set_protected_fields(&owner, &h.collection, RecordTypeId(7), vec!["Notes".into()])
            .await
            .unwrap();
        h.service
            .set_protected_tags(&owner, &h.collection, vec!["leech".into(), "  ".into()])
            .await
            .unwrap();

        let page = h
            .service
            .collection_updates(&reader, &h.collection, &query(None, 10))
            .await
            .unwrap();
        assert_eq!(page.protected_fields["7"], vec!["Notes".to_string()]);
        assert_eq!(page.protected_tags, vec!["leech".to_string()]);

        let fields = h
            .service
            .protected_fields(&reader, &h.collection)
            .await
            .unwrap();
        assert_eq!(fields.fields, page.protected_fields);
    }

    #[tokio::test]
    async fn test_readers_cannot_change_protection() {
        let h = Harness::new(ServiceConfig::default()).await;
        let reader = h.user("reader", Some(Relation::Subscriber));

        let err = h
            .service
            .set_protected_tags(&reader, &h.collection, vec!["x".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_auth_failures() {
        let h = Harness::new(ServiceConfig::default()).await;
        let stranger = h.user("stranger", None);

        let err = h
            .service
            .collection_updates("not-a-token", &h.collection, &query(None, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);

        let err = h
            .service
            .collection_updates("", &h.collection, &query(None, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);

        let err = h
            .service
            .collection_updates(&stranger, &h.collection, &query(None, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = h
            .service
            .collection_updates(&stranger, &CollectionId::new(), &query(None, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_page_size_is_validated_not_clamped() {
        let h = Harness::new(ServiceConfig::default()).await;
        let token = h.user("alice", Some(Relation::Reader));

        for size in [0, -3, 2001] {
            let err = h
                .service
                .collection_updates(&token, &h.collection, &query(None, size))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn test_overlay_isolation() {
        let h = Harness::new(ServiceConfig::default()).await;
        let reader = h.user("reader", Some(Relation::Reader));
        let subscriber = h.user("subscriber", Some(Relation::Subscriber));

        let overlay = Overlay {
            id: OverlayId(9),
            collection_id: h.collection,
            owner_id: SubjectId::new("annotator"),
            name: "Frequency".into(),
            tag_group_name: "freq".into(),
        };
        h.service.store().upsert_overlay(&overlay).await.unwrap();
        let record = h.write(1, 100).await;
        h.service
            .store()
            .assign_overlay_tags(&overlay.id, &record.id, ["top1k".to_string()].into(), 150)
            .await
            .unwrap();

        let err = h
            .service
            .overlay_assignments(&reader, &overlay.id, &PageQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(h
            .service
            .list_overlays(&reader, &h.collection)
            .await
            .unwrap()
            .is_empty());

        let page = h
            .service
            .overlay_assignments(&subscriber, &overlay.id, &PageQuery::default())
            .await
            .unwrap();
        assert_eq!(
            page.assignments,
            vec![AssignmentEntry {
                entity: record.id,
                tags: vec!["top1k".into()],
            }]
        );
        assert_eq!(
            h.service
                .list_overlays(&subscriber, &h.collection)
                .await
                .unwrap(),
            vec![overlay]
        );

        let err = h
            .service
            .overlay_assignments(&subscriber, &OverlayId(404), &PageQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_media_pages_and_download_gate() {
        let h = Harness::new(ServiceConfig::default()).await;
        let token = h.user("alice", Some(Relation::Subscriber));
        let store = h.service.store();
        let hash = ContentHash::of(b"png bytes");
        store
            .upsert_media(&h.collection, "heart.png", hash, 100)
            .await
            .unwrap();
        store
            .upsert_media(&h.collection, "draft.png", ContentHash::of(b"wip"), 110)
            .await
            .unwrap();
        store
            .set_media_download_enabled(&h.collection, "draft.png", false, 120)
            .await
            .unwrap();

        let page = h
            .service
            .media_updates(&token, &h.collection, &PageQuery::default())
            .await
            .unwrap();
        assert_eq!(page.media.len(), 2);
        assert_eq!(page.media[0].name, "heart.png");
        assert_eq!(page.media[0].content_hash, hash.to_hex());
        assert!(!page.media[1].download_enabled);

        let url = h
            .service
            .media_download_url(&token, &h.collection, "heart.png")
            .await
            .unwrap();
        assert!(url
            .url
            .contains(&format!("deck_assets/{}/heart.png", h.collection)));

        let err = h
            .service
            .media_download_url(&token, &h.collection, "draft.png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        store
            .delete_media(&h.collection, "heart.png", 130)
            .await
            .unwrap();
        let err = h
            .service
            .media_download_url(&token, &h.collection, "heart.png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_first_sync_points_at_export() {
        let config = ServiceConfig {
            full_export_threshold: 2,
            ..ServiceConfig::default()
        };
        let h = Harness::new(config).await;
        let owner = h.user("owner", Some(Relation::Owner));
        let reader = h.user("reader", Some(Relation::Reader));
        for i in 0..3 {
            h.write(i, 100 + i).await;
        }

        // Over the threshold but nothing exported yet: plain pages.
        let page = h
            .service
            .collection_updates(&reader, &h.collection, &query(None, 10))
            .await
            .unwrap();
        assert!(page.external_records_url.is_none());
        assert_eq!(page.decode_records().unwrap().len(), 3);

        let snapshot = h
            .service
            .publish_export(&owner, &h.collection)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.record_count, 3);
        let late = h.write(10, 500).await;

        let page = h
            .service
            .collection_updates(&reader, &h.collection, &query(None, 10))
            .await
            .unwrap();
        assert!(page
            .external_records_url
            .as_deref()
            .unwrap()
            .contains(&snapshot.storage_key));
        assert!(page.decode_records().unwrap().is_empty());

        let exported: Vec<EntityRecord> = codec::decode_json(
            &String::from_utf8(h.blobs.get_object(&snapshot.storage_key).unwrap().unwrap())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(exported.len(), 3);

        // Resuming from the export cursor yields only what came after it.
        let rest = h
            .service
            .collection_updates(&reader, &h.collection, &query(page.next.as_ref(), 10))
            .await
            .unwrap();
        assert_eq!(rest.decode_records().unwrap(), vec![late]);
    }

    #[tokio::test]
    async fn test_full_flag_requests_export_below_threshold() {
        let h = Harness::new(ServiceConfig::default()).await;
        let owner = h.user("owner", Some(Relation::Owner));
        h.write(1, 100).await;
        h.service
            .publish_export(&owner, &h.collection)
            .await
            .unwrap();

        let mut q = query(None, 10);
        q.full = true;
        let page = h
            .service
            .collection_updates(&owner, &h.collection, &q)
            .await
            .unwrap();
        assert!(page.external_records_url.is_some());
    }

    #[tokio::test]
    async fn test_export_of_empty_collection() {
        let h = Harness::new(ServiceConfig::default()).await;
        let owner = h.user("owner", Some(Relation::Owner));
        assert!(h
            .service
            .publish_export(&owner, &h.collection)
            .await
            .unwrap()
            .is_none());
    }
}
