//! Extension overlay sync.
//!
//! Each overlay is an independent tag-only layer with its own assignment
//! log and its own cursor namespace. Access checks happen before any of
//! this runs.

use std::collections::BTreeSet;

use deckhub_core::{
    resolve_cursor, CollectionId, CursorKey, EntityId, Overlay, OverlayAssignment, OverlayId,
    PageSize, Revision,
};
use deckhub_store::Store;

use crate::error::{Result, SyncError};
use crate::paginator::{paginate, Page};
use crate::source::{AssignmentLog, PageSource};

/// Overlay reads and writes against a store.
pub struct OverlaySync<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> OverlaySync<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Look up an overlay, failing if it does not exist.
    pub async fn overlay(&self, id: &OverlayId) -> Result<Overlay> {
        self.store
            .get_overlay(id)
            .await?
            .ok_or(SyncError::OverlayNotFound(*id))
    }

    /// Overlays attached to a collection.
    pub async fn overlays_for(&self, collection: &CollectionId) -> Result<Vec<Overlay>> {
        Ok(self.store.list_overlays(collection).await?)
    }

    /// Assignments of `overlay` changed after the `since` cursor token.
    pub async fn assignments_since(
        &self,
        key: &CursorKey,
        overlay: &OverlayId,
        since: Option<&str>,
        size: PageSize,
    ) -> Result<Page<OverlayAssignment>> {
        let source = AssignmentLog::new(self.store, *overlay);
        let position = resolve_cursor(since, key, &source.scope())?;
        self.overlay(overlay).await?;

        let page = paginate(&source, key, position.as_ref(), size).await?;
        tracing::debug!(
            overlay = %overlay,
            count = page.items.len(),
            "served assignment page"
        );
        Ok(page)
    }

    /// Replace the tags `overlay` assigns to `entity`.
    pub async fn assign(
        &self,
        overlay: &OverlayId,
        entity: &EntityId,
        tags: BTreeSet<String>,
        at: Revision,
    ) -> Result<OverlayAssignment> {
        match self.store.assign_overlay_tags(overlay, entity, tags, at).await {
            Err(deckhub_store::StoreError::NotFound(_)) => {
                Err(SyncError::OverlayNotFound(*overlay))
            }
            other => Ok(other?),
        }
    }
}
