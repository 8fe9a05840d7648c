//! The sync paginator.
//!
//! Walks a change log in `(revision, key)` order and cuts it into pages.
//!
//! ## Tie-completion
//!
//! Several items may share one revision. A page that is full is extended
//! with the rest of the run sharing the last item's revision, so a resumed
//! sweep never has to split a run across a cursor. Pages may therefore be
//! larger than the requested size.
//!
//! ## Cursors
//!
//! `next` marks the last delivered item and is only issued when the page
//! reached the requested size; `None` means the client is caught up with
//! the log as it was observed during the query. Cursors are issued and
//! checked under the server's [`CursorKey`].

use deckhub_core::{
    resolve_cursor, CollectionId, Cursor, CursorKey, EntityRecord, PageSize, Paged, Position,
};
use deckhub_store::Store;

use crate::error::{Result, SyncError};
use crate::source::{EntityLog, PageSource};

/// One page of a change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the following page, if there may be one.
    pub next: Option<Cursor>,
    /// Position the client has reached after applying this page.
    ///
    /// The last delivered item, or the incoming cursor when the page is
    /// empty. `None` only for an empty first sweep.
    pub latest: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read one page from `source`, starting strictly after `since`.
pub async fn paginate<P: PageSource>(
    source: &P,
    key: &CursorKey,
    since: Option<&Position>,
    size: PageSize,
) -> Result<Page<P::Item>> {
    let scope = source.scope();
    let mut items = source.after(since, size.get()).await?;
    let full = items.len() == size.get();

    if full {
        if let Some(last) = items.last() {
            let boundary = last.position();
            let rest = source.run_at(boundary.revision, &boundary.key).await?;
            if !rest.is_empty() {
                tracing::debug!(
                    revision = boundary.revision,
                    extra = rest.len(),
                    "extending page to complete revision run"
                );
            }
            items.extend(rest);
        }
    }

    let last = items
        .last()
        .map(|item| Cursor::issue(key, &scope, item.position()));
    let next = if full { last.clone() } else { None };
    let latest = last.or_else(|| since.map(|p| Cursor::issue(key, &scope, p.clone())));

    Ok(Page {
        items,
        next,
        latest,
    })
}

/// Entity records of `collection` changed after the `since` cursor token.
///
/// No token means a full sync from the start of the log.
pub async fn get_page<S: Store + ?Sized>(
    store: &S,
    key: &CursorKey,
    collection: &CollectionId,
    since: Option<&str>,
    size: PageSize,
) -> Result<Page<EntityRecord>> {
    let source = EntityLog::new(store, *collection);
    let position = resolve_cursor(since, key, &source.scope())?;

    if !store.collection_exists(collection).await? {
        return Err(SyncError::CollectionNotFound(*collection));
    }

    let page = paginate(&source, key, position.as_ref(), size).await?;
    tracing::debug!(
        collection = %collection,
        count = page.items.len(),
        more = page.next.is_some(),
        "served entity page"
    );
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhub_core::{EntityDraft, PaginationLimits, RecordTypeId, StreamScope, ValidationError};
    use deckhub_store::MemoryStore;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn size(n: i64) -> PageSize {
        PageSize::new(n, &PaginationLimits::default()).unwrap()
    }

    fn key() -> CursorKey {
        CursorKey::new([3u8; 32])
    }

    /// One entity per revision; equal neighbours go in one batch so they tie.
    async fn seeded(revisions: &[i64]) -> (MemoryStore, CollectionId) {
        let store = MemoryStore::new();
        let collection = CollectionId::new();
        store.create_collection(&collection, "deck", 0).await.unwrap();

        let mut start = 0;
        while start < revisions.len() {
            let at = revisions[start];
            let end = revisions[start..]
                .iter()
                .position(|r| *r != at)
                .map_or(revisions.len(), |n| start + n);
            let drafts = (start..end)
                .map(|i| EntityDraft::new(i as i64, RecordTypeId(1)))
                .collect();
            store.upsert_entities(&collection, drafts, at).await.unwrap();
            start = end;
        }
        (store, collection)
    }

    async fn sweep(
        store: &MemoryStore,
        collection: &CollectionId,
        page_size: i64,
    ) -> Vec<EntityRecord> {
        let mut out = Vec::new();
        let mut since: Option<String> = None;
        loop {
            let page = get_page(store, &key(), collection, since.as_deref(), size(page_size))
                .await
                .unwrap();
            out.extend(page.items);
            match page.next {
                Some(next) => since = Some(next.to_token()),
                None => return out,
            }
        }
    }

    #[tokio::test]
    async fn test_end_to_end_pages() {
        let (store, collection) = seeded(&[100, 200, 300]).await;
        let all = store.entities_after(&collection, None, 10).await.unwrap();

        let first = get_page(&store, &key(), &collection, None, size(2)).await.unwrap();
        assert_eq!(first.items, all[..2].to_vec());
        let next = first.next.unwrap();
        assert_eq!(next.revision(), 200);

        let second = get_page(&store, &key(), &collection, Some(&next.to_token()), size(2))
            .await
            .unwrap();
        assert_eq!(second.items, all[2..].to_vec());
        assert!(second.next.is_none());
        assert_eq!(second.latest.unwrap().revision(), 300);
    }

    #[tokio::test]
    async fn test_tie_completion() {
        let (store, collection) = seeded(&[50, 50, 50, 50, 50]).await;

        let page = get_page(&store, &key(), &collection, None, size(2)).await.unwrap();
        assert_eq!(page.items.len(), 5);

        let records = sweep(&store, &collection, 2).await;
        let ids: HashSet<_> = records.iter().map(|r| r.id).collect();
        assert_eq!(records.len(), 5);
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn test_run_after_boundary_is_not_pulled_in() {
        let (store, collection) = seeded(&[10, 20, 20, 30]).await;

        let page = get_page(&store, &key(), &collection, None, size(2)).await.unwrap();
        // The page ends inside the run at 20, so the whole run comes along.
        assert_eq!(page.items.len(), 3);
        assert!(page.items.iter().all(|r| r.revision <= 20));
    }

    #[tokio::test]
    async fn test_write_at_cursor_revision_is_delivered() {
        let (store, collection) = seeded(&[100, 100]).await;
        let first = get_page(&store, &key(), &collection, None, size(2)).await.unwrap();
        let cursor = first.next.unwrap();
        assert_eq!(cursor.revision(), 100);

        // Same requested time as the cursor, and the smallest key of the run.
        let synced = first.items[0].clone();
        let updated = store
            .upsert_entity(
                &collection,
                EntityDraft::new(synced.natural_key, RecordTypeId(1))
                    .with_id(synced.id)
                    .field("Front", "edited"),
                100,
            )
            .await
            .unwrap();
        let created = store
            .upsert_entity(&collection, EntityDraft::new(50, RecordTypeId(1)), 100)
            .await
            .unwrap();
        assert!(updated.revision > cursor.revision());

        let resumed = get_page(&store, &key(), &collection, Some(&cursor.to_token()), size(10))
            .await
            .unwrap();
        assert_eq!(resumed.items, vec![updated, created]);
    }

    #[tokio::test]
    async fn test_exactly_full_last_page_then_empty() {
        let (store, collection) = seeded(&[1, 2]).await;

        let page = get_page(&store, &key(), &collection, None, size(2)).await.unwrap();
        let next = page.next.unwrap();
        let tail = get_page(&store, &key(), &collection, Some(&next.to_token()), size(2))
            .await
            .unwrap();
        assert!(tail.is_empty());
        assert!(tail.next.is_none());
        // Nothing new: the client stays where it was.
        assert_eq!(tail.latest, Some(next));
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let (store, collection) = seeded(&[]).await;
        let page = get_page(&store, &key(), &collection, None, size(10)).await.unwrap();
        assert!(page.is_empty());
        assert!(page.next.is_none());
        assert!(page.latest.is_none());
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let store = MemoryStore::new();
        let err = get_page(&store, &key(), &CollectionId::new(), None, size(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_cursor_from_other_collection_is_rejected() {
        let (store, collection) = seeded(&[1]).await;
        let foreign = Cursor::issue(
            &key(),
            &StreamScope::Entities(CollectionId::new()),
            Position::new(1, "x"),
        );

        let err = get_page(&store, &key(), &collection, Some(&foreign.to_token()), size(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::Cursor(_))));

        let err = get_page(&store, &key(), &collection, Some("zz"), size(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cursor_minted_without_server_key_is_rejected() {
        let (store, collection) = seeded(&[1, 2, 3]).await;
        let minted = Cursor::issue(
            &CursorKey::new([0u8; 32]),
            &StreamScope::Entities(collection),
            Position::new(2, ""),
        );

        let err = get_page(&store, &key(), &collection, Some(&minted.to_token()), size(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::Cursor(_))));
    }

    #[tokio::test]
    async fn test_deletions_are_delivered() {
        let (store, collection) = seeded(&[10, 20]).await;
        let first = get_page(&store, &key(), &collection, None, size(10)).await.unwrap();
        let cursor = first.latest.unwrap();

        let victim = first.items[0].id;
        store.delete_entity(&collection, &victim, 30).await.unwrap();

        let page = get_page(&store, &key(), &collection, Some(&cursor.to_token()), size(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, victim);
        assert!(page.items[0].change_kind.is_deleted());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_sweep_never_omits_records(
            revisions in prop::collection::vec(0i64..8, 0..40),
            page_size in 1i64..12,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let mut sorted = revisions.clone();
                sorted.sort();
                let (store, collection) = seeded(&sorted).await;

                let records = sweep(&store, &collection, page_size).await;
                let ids: HashSet<_> = records.iter().map(|r| r.id).collect();
                assert_eq!(ids.len(), revisions.len());
                assert_eq!(records.len(), revisions.len());
            });
        }
    }
}
