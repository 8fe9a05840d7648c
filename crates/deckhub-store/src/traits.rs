//! Store trait: the abstract interface for catalog persistence.
//!
//! This trait allows the sync core to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::collections::BTreeSet;

use async_trait::async_trait;
use deckhub_core::{
    CollectionId, ContentHash, EntityDraft, EntityId, EntityRecord, MediaRecord, MediaUpsert,
    Overlay, OverlayAssignment, OverlayId, Position, ProtectionRules, RecordTypeId, Revision,
};

use crate::error::Result;

/// A bulk export of a collection, kept in the blob store.
///
/// `position` is the log position the export covers up to and including,
/// so a client can resume incremental sync right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSnapshot {
    /// Blob store key of the export file.
    pub storage_key: String,
    pub position: Position,
    pub record_count: u64,
    /// When the export was produced (Unix ms).
    pub created_at: i64,
}

/// The Store trait: async interface for catalog persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Store-assigned revisions**: every write takes a requested time `at`;
///   the store assigns `at` when it is past the newest revision of the
///   stream and `newest + 1` otherwise. A single write therefore always
///   lands strictly after every cursor already issued.
/// - **Ties come from batches**: `upsert_entities` commits its drafts
///   atomically at one shared revision. Readers see all of the batch or
///   none of it.
/// - **Log scans**: `*_after` returns items strictly after a position in
///   `(revision, key)` order; `*_at` returns the rest of a run of items that
///   share one revision. Together they are all the paginator needs.
/// - **Deletes are changes**: deleted entities and media stay in the log
///   with a fresh revision.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Collections
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a collection. Idempotent.
    async fn create_collection(&self, id: &CollectionId, name: &str, at: i64) -> Result<()>;

    /// Check if a collection exists.
    async fn collection_exists(&self, id: &CollectionId) -> Result<bool>;

    /// Number of entity records in the collection's log, deleted included.
    async fn entity_count(&self, id: &CollectionId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entity change log
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or replace an entity. Returns the stored record.
    async fn upsert_entity(
        &self,
        collection: &CollectionId,
        draft: EntityDraft,
        at: Revision,
    ) -> Result<EntityRecord>;

    /// Create or replace several entities at one shared revision.
    ///
    /// All or nothing: a natural-key conflict anywhere rejects the batch.
    async fn upsert_entities(
        &self,
        collection: &CollectionId,
        drafts: Vec<EntityDraft>,
        at: Revision,
    ) -> Result<Vec<EntityRecord>>;

    /// Mark an entity deleted. Returns `None` if it never existed.
    async fn delete_entity(
        &self,
        collection: &CollectionId,
        id: &EntityId,
        at: Revision,
    ) -> Result<Option<EntityRecord>>;

    /// Get one entity by ID.
    async fn get_entity(
        &self,
        collection: &CollectionId,
        id: &EntityId,
    ) -> Result<Option<EntityRecord>>;

    /// Up to `limit` entities strictly after `after`, in log order.
    async fn entities_after(
        &self,
        collection: &CollectionId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<EntityRecord>>;

    /// All entities at exactly `revision` whose key sorts after `after_key`.
    async fn entities_at(
        &self,
        collection: &CollectionId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<EntityRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Media index
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an upload of `name` with the given content hash.
    ///
    /// A byte-identical re-upload of an existing asset is a no-op.
    async fn upsert_media(
        &self,
        collection: &CollectionId,
        name: &str,
        hash: ContentHash,
        at: Revision,
    ) -> Result<MediaUpsert>;

    /// Mark an asset deleted. Returns false if there was nothing to delete.
    async fn delete_media(&self, collection: &CollectionId, name: &str, at: Revision)
        -> Result<bool>;

    /// Open or close the download gate of an asset.
    async fn set_media_download_enabled(
        &self,
        collection: &CollectionId,
        name: &str,
        enabled: bool,
        at: Revision,
    ) -> Result<bool>;

    /// Get one asset by name.
    async fn get_media(&self, collection: &CollectionId, name: &str)
        -> Result<Option<MediaRecord>>;

    /// Up to `limit` media records strictly after `after`, in log order.
    async fn media_after(
        &self,
        collection: &CollectionId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<MediaRecord>>;

    /// All media records at exactly `revision` whose name sorts after `after_key`.
    async fn media_at(
        &self,
        collection: &CollectionId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<MediaRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Protection rules
    // ─────────────────────────────────────────────────────────────────────────

    /// Current protection rules (empty if none were ever set).
    async fn get_protection(&self, collection: &CollectionId) -> Result<ProtectionRules>;

    /// Replace the protected field names of one record type, leaving every
    /// other rule untouched. An empty set clears the type.
    ///
    /// Returns the rules as they stand after the change.
    async fn replace_protected_fields(
        &self,
        collection: &CollectionId,
        type_id: RecordTypeId,
        names: BTreeSet<String>,
    ) -> Result<ProtectionRules>;

    /// Replace the protected tag names, leaving field rules untouched.
    async fn replace_protected_tags(
        &self,
        collection: &CollectionId,
        tags: BTreeSet<String>,
    ) -> Result<ProtectionRules>;

    // ─────────────────────────────────────────────────────────────────────────
    // Extension overlays
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or update an overlay definition.
    async fn upsert_overlay(&self, overlay: &Overlay) -> Result<()>;

    /// Get an overlay by ID.
    async fn get_overlay(&self, id: &OverlayId) -> Result<Option<Overlay>>;

    /// List overlays attached to a collection, ordered by ID.
    async fn list_overlays(&self, collection: &CollectionId) -> Result<Vec<Overlay>>;

    /// Replace the tags an overlay assigns to an entity.
    async fn assign_overlay_tags(
        &self,
        overlay: &OverlayId,
        entity: &EntityId,
        tags: BTreeSet<String>,
        at: Revision,
    ) -> Result<OverlayAssignment>;

    /// Up to `limit` assignments strictly after `after`, in log order.
    async fn assignments_after(
        &self,
        overlay: &OverlayId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<OverlayAssignment>>;

    /// All assignments at exactly `revision` whose key sorts after `after_key`.
    async fn assignments_at(
        &self,
        overlay: &OverlayId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<OverlayAssignment>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk exports
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a bulk export snapshot for a collection.
    async fn record_export(&self, collection: &CollectionId, snapshot: &ExportSnapshot)
        -> Result<()>;

    /// The most recent export (largest position), if any.
    async fn latest_export(&self, collection: &CollectionId) -> Result<Option<ExportSnapshot>>;
}
