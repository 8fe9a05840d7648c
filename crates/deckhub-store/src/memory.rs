//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use deckhub_core::{
    ChangeKind, CollectionId, ContentHash, EntityDraft, EntityId, EntityRecord, MediaRecord,
    MediaUpsert, Overlay, OverlayAssignment, OverlayId, Paged, Position, ProtectionRules,
    RecordTypeId, Revision,
};

use crate::error::{Result, StoreError};
use crate::traits::{ExportSnapshot, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    collections: HashMap<CollectionId, CollectionState>,
    overlays: HashMap<OverlayId, OverlayState>,
}

#[derive(Default)]
struct CollectionState {
    entities: ChangeLog<EntityRecord>,
    /// natural_key -> entity, deleted entities included.
    natural_keys: HashMap<i64, EntityId>,
    media: ChangeLog<MediaRecord>,
    protection: ProtectionRules,
    exports: Vec<ExportSnapshot>,
}

struct OverlayState {
    overlay: Overlay,
    assignments: ChangeLog<OverlayAssignment>,
}

/// Latest state per key, plus an index in log order.
struct ChangeLog<T> {
    items: HashMap<String, T>,
    order: BTreeMap<Position, String>,
}

impl<T> Default for ChangeLog<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            order: BTreeMap::new(),
        }
    }
}

impl<T: Paged + Clone> ChangeLog<T> {
    /// Revision for a write requested at `at`; always past the log's newest.
    fn next_revision(&self, at: Revision) -> Revision {
        match self.order.last_key_value() {
            Some((newest, _)) if at <= newest.revision => newest.revision + 1,
            _ => at,
        }
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    fn put(&mut self, key: String, item: T) {
        if let Some(old) = self.items.get(&key) {
            self.order.remove(&old.position());
        }
        self.order.insert(item.position(), key.clone());
        self.items.insert(key, item);
    }

    fn after(&self, after: Option<&Position>, limit: usize) -> Vec<T> {
        let lower = match after {
            Some(position) => Bound::Excluded(position.clone()),
            None => Bound::Unbounded,
        };
        self.order
            .range((lower, Bound::Unbounded))
            .take(limit)
            .filter_map(|(_, key)| self.items.get(key).cloned())
            .collect()
    }

    fn at(&self, revision: Revision, after_key: &str) -> Vec<T> {
        let lower = Bound::Excluded(Position::new(revision, after_key));
        self.order
            .range((lower, Bound::Unbounded))
            .take_while(|(position, _)| position.revision == revision)
            .filter_map(|(_, key)| self.items.get(key).cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl CollectionState {
    /// Reject drafts whose natural key belongs to another entity, either in
    /// the store or earlier in the same batch.
    fn check_natural_keys(&self, drafts: &[EntityDraft]) -> Result<()> {
        let mut claimed: HashMap<i64, EntityId> = HashMap::new();
        for draft in drafts {
            let owner = claimed
                .get(&draft.natural_key)
                .or_else(|| self.natural_keys.get(&draft.natural_key));
            if let Some(owner) = owner {
                if *owner != draft.id {
                    return Err(StoreError::Conflict(format!(
                        "natural key {} already belongs to {}",
                        draft.natural_key, owner
                    )));
                }
            }
            claimed.insert(draft.natural_key, draft.id);
        }
        Ok(())
    }

    fn put_entity(
        &mut self,
        collection: CollectionId,
        draft: EntityDraft,
        revision: Revision,
    ) -> EntityRecord {
        let key = draft.id.sort_key();
        let previous = self.entities.get(&key).cloned();
        let change_kind = match &previous {
            Some(prev) if !prev.change_kind.is_deleted() => ChangeKind::Updated,
            _ => ChangeKind::Created,
        };
        if let Some(prev) = &previous {
            if prev.natural_key != draft.natural_key {
                self.natural_keys.remove(&prev.natural_key);
            }
        }

        let record = draft.into_record(collection, revision, change_kind);
        self.natural_keys.insert(record.natural_key, record.id);
        self.entities.put(key, record.clone());
        record
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn collection_mut(&mut self, id: &CollectionId) -> Result<&mut CollectionState> {
        self.collections
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", id)))
    }

    fn overlay_mut(&mut self, id: &OverlayId) -> Result<&mut OverlayState> {
        self.overlays
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("overlay {}", id)))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_collection(&self, id: &CollectionId, _name: &str, _at: i64) -> Result<()> {
        let mut inner = self.write()?;
        inner.collections.entry(*id).or_default();
        Ok(())
    }

    async fn collection_exists(&self, id: &CollectionId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.collections.contains_key(id))
    }

    async fn entity_count(&self, id: &CollectionId) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(id)
            .map(|c| c.entities.len() as u64)
            .unwrap_or(0))
    }

    async fn upsert_entity(
        &self,
        collection: &CollectionId,
        draft: EntityDraft,
        at: Revision,
    ) -> Result<EntityRecord> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;

        state.check_natural_keys(std::slice::from_ref(&draft))?;
        let revision = state.entities.next_revision(at);
        Ok(state.put_entity(*collection, draft, revision))
    }

    async fn upsert_entities(
        &self,
        collection: &CollectionId,
        drafts: Vec<EntityDraft>,
        at: Revision,
    ) -> Result<Vec<EntityRecord>> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        state.check_natural_keys(&drafts)?;
        let revision = state.entities.next_revision(at);
        Ok(drafts
            .into_iter()
            .map(|draft| state.put_entity(*collection, draft, revision))
            .collect())
    }

    async fn delete_entity(
        &self,
        collection: &CollectionId,
        id: &EntityId,
        at: Revision,
    ) -> Result<Option<EntityRecord>> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;

        let key = id.sort_key();
        let Some(existing) = state.entities.get(&key).cloned() else {
            return Ok(None);
        };
        if existing.change_kind.is_deleted() {
            return Ok(Some(existing));
        }

        let record = EntityRecord {
            revision: state.entities.next_revision(at),
            change_kind: ChangeKind::Deleted,
            ..existing
        };
        state.entities.put(key, record.clone());
        Ok(Some(record))
    }

    async fn get_entity(
        &self,
        collection: &CollectionId,
        id: &EntityId,
    ) -> Result<Option<EntityRecord>> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.entities.get(&id.sort_key()).cloned()))
    }

    async fn entities_after(
        &self,
        collection: &CollectionId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<EntityRecord>> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.entities.after(after, limit))
            .unwrap_or_default())
    }

    async fn entities_at(
        &self,
        collection: &CollectionId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<EntityRecord>> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.entities.at(revision, after_key))
            .unwrap_or_default())
    }

    async fn upsert_media(
        &self,
        collection: &CollectionId,
        name: &str,
        hash: ContentHash,
        at: Revision,
    ) -> Result<MediaUpsert> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;

        let (outcome, download_enabled) = match state.media.get(name) {
            None => (MediaUpsert::Created, true),
            Some(existing) if existing.exists && existing.content_hash == hash => {
                return Ok(MediaUpsert::Unchanged);
            }
            Some(existing) => (MediaUpsert::Replaced, existing.download_enabled),
        };

        let record = MediaRecord {
            name: name.to_string(),
            content_hash: hash,
            modified_at: state.media.next_revision(at),
            exists: true,
            download_enabled,
        };
        state.media.put(name.to_string(), record);
        Ok(outcome)
    }

    async fn delete_media(
        &self,
        collection: &CollectionId,
        name: &str,
        at: Revision,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;

        let Some(existing) = state.media.get(name).cloned() else {
            return Ok(false);
        };
        if !existing.exists {
            return Ok(false);
        }

        let record = MediaRecord {
            modified_at: state.media.next_revision(at),
            exists: false,
            ..existing
        };
        state.media.put(name.to_string(), record);
        Ok(true)
    }

    async fn set_media_download_enabled(
        &self,
        collection: &CollectionId,
        name: &str,
        enabled: bool,
        at: Revision,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;

        let Some(existing) = state.media.get(name).cloned() else {
            return Ok(false);
        };
        if existing.download_enabled == enabled {
            return Ok(true);
        }

        let record = MediaRecord {
            modified_at: state.media.next_revision(at),
            download_enabled: enabled,
            ..existing
        };
        state.media.put(name.to_string(), record);
        Ok(true)
    }

    async fn get_media(
        &self,
        collection: &CollectionId,
        name: &str,
    ) -> Result<Option<MediaRecord>> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.media.get(name).cloned()))
    }

    async fn media_after(
        &self,
        collection: &CollectionId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<MediaRecord>> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.media.after(after, limit))
            .unwrap_or_default())
    }

    async fn media_at(
        &self,
        collection: &CollectionId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<MediaRecord>> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.media.at(revision, after_key))
            .unwrap_or_default())
    }

    async fn get_protection(&self, collection: &CollectionId) -> Result<ProtectionRules> {
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.protection.clone())
            .unwrap_or_default())
    }

    async fn replace_protected_fields(
        &self,
        collection: &CollectionId,
        type_id: RecordTypeId,
        names: BTreeSet<String>,
    ) -> Result<ProtectionRules> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;
        state.protection.set_fields(type_id, names);
        Ok(state.protection.clone())
    }

    async fn replace_protected_tags(
        &self,
        collection: &CollectionId,
        tags: BTreeSet<String>,
    ) -> Result<ProtectionRules> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;
        state.protection.set_tags(tags);
        Ok(state.protection.clone())
    }

    async fn upsert_overlay(&self, overlay: &Overlay) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.collections.contains_key(&overlay.collection_id) {
            return Err(StoreError::NotFound(format!(
                "collection {}",
                overlay.collection_id
            )));
        }

        match inner.overlays.get_mut(&overlay.id) {
            Some(state) => state.overlay = overlay.clone(),
            None => {
                inner.overlays.insert(
                    overlay.id,
                    OverlayState {
                        overlay: overlay.clone(),
                        assignments: ChangeLog::default(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_overlay(&self, id: &OverlayId) -> Result<Option<Overlay>> {
        let inner = self.read()?;
        Ok(inner.overlays.get(id).map(|s| s.overlay.clone()))
    }

    async fn list_overlays(&self, collection: &CollectionId) -> Result<Vec<Overlay>> {
        let inner = self.read()?;
        let mut overlays: Vec<Overlay> = inner
            .overlays
            .values()
            .filter(|s| s.overlay.collection_id == *collection)
            .map(|s| s.overlay.clone())
            .collect();
        overlays.sort_by_key(|o| o.id);
        Ok(overlays)
    }

    async fn assign_overlay_tags(
        &self,
        overlay: &OverlayId,
        entity: &EntityId,
        tags: BTreeSet<String>,
        at: Revision,
    ) -> Result<OverlayAssignment> {
        let mut inner = self.write()?;
        let state = inner.overlay_mut(overlay)?;

        let assignment = OverlayAssignment {
            overlay_id: *overlay,
            entity_id: *entity,
            tags,
            revision: state.assignments.next_revision(at),
        };
        state
            .assignments
            .put(entity.sort_key(), assignment.clone());
        Ok(assignment)
    }

    async fn assignments_after(
        &self,
        overlay: &OverlayId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<OverlayAssignment>> {
        let inner = self.read()?;
        Ok(inner
            .overlays
            .get(overlay)
            .map(|s| s.assignments.after(after, limit))
            .unwrap_or_default())
    }

    async fn assignments_at(
        &self,
        overlay: &OverlayId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<OverlayAssignment>> {
        let inner = self.read()?;
        Ok(inner
            .overlays
            .get(overlay)
            .map(|s| s.assignments.at(revision, after_key))
            .unwrap_or_default())
    }

    async fn record_export(
        &self,
        collection: &CollectionId,
        snapshot: &ExportSnapshot,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let state = inner.collection_mut(collection)?;
        state
            .exports
            .retain(|e| e.storage_key != snapshot.storage_key);
        state.exports.push(snapshot.clone());
        Ok(())
    }

    async fn latest_export(&self, collection: &CollectionId) -> Result<Option<ExportSnapshot>> {
        let inner = self.read()?;
        Ok(inner.collections.get(collection).and_then(|c| {
            c.exports
                .iter()
                .max_by(|a, b| a.position.cmp(&b.position))
                .cloned()
        }))
    }
}
