//! Media dedup index.
//!
//! Tracks which assets of a collection changed, keyed on content hash, so
//! clients download only bytes they do not already hold. The index never
//! touches asset bytes itself.

use deckhub_core::{
    resolve_cursor, CollectionId, ContentHash, CursorKey, MediaRecord, MediaUpsert, PageSize,
    Revision,
};
use deckhub_store::Store;

use crate::error::{Result, SyncError};
use crate::paginator::{paginate, Page};
use crate::source::{MediaLog, PageSource};

/// Media index of a store.
pub struct MediaIndex<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> MediaIndex<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Media records changed after the `since` cursor token.
    ///
    /// Same pagination discipline as entity pages, keyed on `modified_at`
    /// and tie-broken by name. A single write always moves an asset past every
    /// cursor already issued.
    pub async fn changed_since(
        &self,
        key: &CursorKey,
        collection: &CollectionId,
        since: Option<&str>,
        size: PageSize,
    ) -> Result<Page<MediaRecord>> {
        let source = MediaLog::new(self.store, *collection);
        let position = resolve_cursor(since, key, &source.scope())?;
        self.ensure_collection(collection).await?;

        let page = paginate(&source, key, position.as_ref(), size).await?;
        tracing::debug!(
            collection = %collection,
            count = page.items.len(),
            "served media page"
        );
        Ok(page)
    }

    /// Record an upload of `bytes` under `name`.
    pub async fn record_upload(
        &self,
        collection: &CollectionId,
        name: &str,
        bytes: &[u8],
        at: Revision,
    ) -> Result<MediaUpsert> {
        let hash = ContentHash::of(bytes);
        let outcome = self.store.upsert_media(collection, name, hash, at).await?;
        if outcome == MediaUpsert::Unchanged {
            tracing::debug!(collection = %collection, name, "identical re-upload ignored");
        }
        Ok(outcome)
    }

    /// Delete an asset. The deletion itself is a visible change.
    pub async fn delete(&self, collection: &CollectionId, name: &str, at: Revision) -> Result<bool> {
        Ok(self.store.delete_media(collection, name, at).await?)
    }

    /// Open or close the download gate of an asset.
    pub async fn set_download_enabled(
        &self,
        collection: &CollectionId,
        name: &str,
        enabled: bool,
        at: Revision,
    ) -> Result<bool> {
        Ok(self
            .store
            .set_media_download_enabled(collection, name, enabled, at)
            .await?)
    }

    /// Current state of one asset.
    pub async fn get(&self, collection: &CollectionId, name: &str) -> Result<Option<MediaRecord>> {
        Ok(self.store.get_media(collection, name).await?)
    }

    async fn ensure_collection(&self, collection: &CollectionId) -> Result<()> {
        if self.store.collection_exists(collection).await? {
            Ok(())
        } else {
            Err(SyncError::CollectionNotFound(*collection))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhub_core::PaginationLimits;
    use deckhub_store::MemoryStore;

    fn size(n: i64) -> PageSize {
        PageSize::new(n, &PaginationLimits::default()).unwrap()
    }

    fn key() -> CursorKey {
        CursorKey::new([5u8; 32])
    }

    async fn setup() -> (MemoryStore, CollectionId) {
        let store = MemoryStore::new();
        let collection = CollectionId::new();
        store.create_collection(&collection, "deck", 0).await.unwrap();
        (store, collection)
    }

    #[tokio::test]
    async fn test_identical_reupload_is_invisible() {
        let (store, collection) = setup().await;
        let index = MediaIndex::new(&store);

        index
            .record_upload(&collection, "heart.png", b"png bytes", 10)
            .await
            .unwrap();
        let first = index.changed_since(&key(), &collection, None, size(10)).await.unwrap();
        let cursor = first.latest.unwrap().to_token();

        assert_eq!(
            index
                .record_upload(&collection, "heart.png", b"png bytes", 20)
                .await
                .unwrap(),
            MediaUpsert::Unchanged
        );
        let page = index
            .changed_since(&key(), &collection, Some(&cursor), size(10))
            .await
            .unwrap();
        assert!(page.is_empty());

        let record = index.get(&collection, "heart.png").await.unwrap().unwrap();
        assert_eq!(record.modified_at, 10);
        assert_eq!(record.content_hash, ContentHash::of(b"png bytes"));
    }

    #[tokio::test]
    async fn test_changed_bytes_update_hash_and_time() {
        let (store, collection) = setup().await;
        let index = MediaIndex::new(&store);

        index
            .record_upload(&collection, "a.mp3", b"v1", 10)
            .await
            .unwrap();
        index
            .record_upload(&collection, "a.mp3", b"v2", 20)
            .await
            .unwrap();

        let record = index.get(&collection, "a.mp3").await.unwrap().unwrap();
        assert_eq!(record.content_hash, ContentHash::of(b"v2"));
        assert_eq!(record.modified_at, 20);
    }

    #[tokio::test]
    async fn test_deletion_is_listed() {
        let (store, collection) = setup().await;
        let index = MediaIndex::new(&store);

        index.record_upload(&collection, "x.jpg", b"x", 1).await.unwrap();
        let cursor = index
            .changed_since(&key(), &collection, None, size(10))
            .await
            .unwrap()
            .latest
            .unwrap()
            .to_token();

        assert!(index.delete(&collection, "x.jpg", 5).await.unwrap());
        let page = index
            .changed_since(&key(), &collection, Some(&cursor), size(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.items[0].exists);
        assert_eq!(page.items[0].modified_at, 5);
    }

    #[tokio::test]
    async fn test_disabled_download_is_still_listed() {
        let (store, collection) = setup().await;
        let index = MediaIndex::new(&store);

        index.record_upload(&collection, "s.png", b"s", 1).await.unwrap();
        index
            .set_download_enabled(&collection, "s.png", false, 2)
            .await
            .unwrap();

        let page = index.changed_since(&key(), &collection, None, size(10)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].exists);
        assert!(!page.items[0].download_enabled);
    }

    #[tokio::test]
    async fn test_same_time_uploads_follow_upload_order() {
        let (store, collection) = setup().await;
        let index = MediaIndex::new(&store);

        for name in ["c.png", "a.png"] {
            index
                .record_upload(&collection, name, name.as_bytes(), 7)
                .await
                .unwrap();
        }
        let page = index.changed_since(&key(), &collection, None, size(10)).await.unwrap();
        let seen: Vec<_> = page.items.iter().map(|m| (m.name.as_str(), m.modified_at)).collect();
        assert_eq!(seen, vec![("c.png", 7), ("a.png", 8)]);

        // A later upload requested at an already-served time is still picked up.
        let cursor = page.latest.unwrap().to_token();
        index
            .record_upload(&collection, "b.png", b"b", 7)
            .await
            .unwrap();
        let page = index
            .changed_since(&key(), &collection, Some(&cursor), size(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "b.png");
        assert_eq!(page.items[0].modified_at, 9);
    }

    #[tokio::test]
    async fn test_entity_cursor_is_rejected_for_media() {
        let (store, collection) = setup().await;
        let entity_page = crate::paginator::get_page(&store, &key(), &collection, None, size(1))
            .await
            .unwrap();
        assert!(entity_page.latest.is_none());

        let token = deckhub_core::Cursor::issue(
            &key(),
            &deckhub_core::StreamScope::Entities(collection),
            deckhub_core::Position::new(1, "k"),
        )
        .to_token();
        let err = MediaIndex::new(&store)
            .changed_since(&key(), &collection, Some(&token), size(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
