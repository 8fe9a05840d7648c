//! Change log sources the paginator reads from.
//!
//! Each stream (entities, media, overlay assignments) is exposed through the
//! same two scans so one pagination algorithm serves all of them.

use async_trait::async_trait;

use deckhub_core::{
    CollectionId, EntityRecord, MediaRecord, OverlayAssignment, OverlayId, Paged, Position,
    Revision, StreamScope,
};
use deckhub_store::Store;

use crate::error::Result;

/// A change log ordered by `(revision, key)`.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Paged + Send;

    /// The stream cursors from this source are bound to.
    fn scope(&self) -> StreamScope;

    /// Up to `limit` items strictly after `after`, in log order.
    async fn after(&self, after: Option<&Position>, limit: usize) -> Result<Vec<Self::Item>>;

    /// Every item at exactly `revision` whose key sorts after `after_key`.
    async fn run_at(&self, revision: Revision, after_key: &str) -> Result<Vec<Self::Item>>;
}

/// Entity change log of one collection.
pub struct EntityLog<'a, S: ?Sized> {
    store: &'a S,
    collection: CollectionId,
}

impl<'a, S: Store + ?Sized> EntityLog<'a, S> {
    pub fn new(store: &'a S, collection: CollectionId) -> Self {
        Self { store, collection }
    }
}

#[async_trait]
impl<'a, S: Store + ?Sized> PageSource for EntityLog<'a, S> {
    type Item = EntityRecord;

    fn scope(&self) -> StreamScope {
        StreamScope::Entities(self.collection)
    }

    async fn after(&self, after: Option<&Position>, limit: usize) -> Result<Vec<EntityRecord>> {
        Ok(self
            .store
            .entities_after(&self.collection, after, limit)
            .await?)
    }

    async fn run_at(&self, revision: Revision, after_key: &str) -> Result<Vec<EntityRecord>> {
        Ok(self
            .store
            .entities_at(&self.collection, revision, after_key)
            .await?)
    }
}

/// Media index of one collection.
pub struct MediaLog<'a, S: ?Sized> {
    store: &'a S,
    collection: CollectionId,
}

impl<'a, S: Store + ?Sized> MediaLog<'a, S> {
    pub fn new(store: &'a S, collection: CollectionId) -> Self {
        Self { store, collection }
    }
}

#[async_trait]
impl<'a, S: Store + ?Sized> PageSource for MediaLog<'a, S> {
    type Item = MediaRecord;

    fn scope(&self) -> StreamScope {
        StreamScope::Media(self.collection)
    }

    async fn after(&self, after: Option<&Position>, limit: usize) -> Result<Vec<MediaRecord>> {
        Ok(self.store.media_after(&self.collection, after, limit).await?)
    }

    async fn run_at(&self, revision: Revision, after_key: &str) -> Result<Vec<MediaRecord>> {
        Ok(self
            .store
            .media_at(&self.collection, revision, after_key)
            .await?)
    }
}

/// Assignment log of one extension overlay.
pub struct AssignmentLog<'a, S: ?Sized> {
    store: &'a S,
    overlay: OverlayId,
}

impl<'a, S: Store + ?Sized> AssignmentLog<'a, S> {
    pub fn new(store: &'a S, overlay: OverlayId) -> Self {
        Self { store, overlay }
    }
}

#[async_trait]
impl<'a, S: Store + ?Sized> PageSource for AssignmentLog<'a, S> {
    type Item = OverlayAssignment;

    fn scope(&self) -> StreamScope {
        StreamScope::Assignments(self.overlay)
    }

    async fn after(
        &self,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<OverlayAssignment>> {
        Ok(self
            .store
            .assignments_after(&self.overlay, after, limit)
            .await?)
    }

    async fn run_at(&self, revision: Revision, after_key: &str) -> Result<Vec<OverlayAssignment>> {
        Ok(self
            .store
            .assignments_at(&self.overlay, revision, after_key)
            .await?)
    }
}
