//! Client-side sweep driver.
//!
//! Fetches successive entity pages until the feed reports no `next`
//! cursor, retrying transient failures and folding the records into one
//! set where the latest revision of each entity wins.

use std::collections::HashMap;

use async_trait::async_trait;

use deckhub_core::{CollectionId, Cursor, EntityId, EntityRecord, Paged};
use deckhub_store::Store;

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::service::{SyncService, UpdatesPage, UpdatesQuery};

/// Anything that serves entity update pages.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    async fn fetch(&self, since: Option<&Cursor>, size: i64) -> Result<UpdatesPage>;
}

/// Feed reading one collection straight from a [`SyncService`].
pub struct CollectionFeed<'a, S: Store + ?Sized> {
    service: &'a SyncService<S>,
    token: String,
    collection: CollectionId,
}

impl<'a, S: Store + ?Sized> CollectionFeed<'a, S> {
    pub fn new(
        service: &'a SyncService<S>,
        token: impl Into<String>,
        collection: CollectionId,
    ) -> Self {
        Self {
            service,
            token: token.into(),
            collection,
        }
    }
}

#[async_trait]
impl<'a, S: Store + ?Sized> UpdateFeed for CollectionFeed<'a, S> {
    async fn fetch(&self, since: Option<&Cursor>, size: i64) -> Result<UpdatesPage> {
        let query = UpdatesQuery {
            since: since.map(Cursor::to_token),
            size: Some(size),
            full: false,
        };
        self.service
            .collection_updates(&self.token, &self.collection, &query)
            .await
    }
}

/// Result of a completed sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// One record per entity, in log order.
    pub records: Vec<EntityRecord>,
    /// Where the next sweep should start.
    pub latest: Option<Cursor>,
    /// Bulk export the feed pointed at, if any. Its records are not fetched.
    pub external_records_url: Option<String>,
    pub pages: usize,
}

/// Drives a feed to the end.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub page_size: i64,
    pub retry: RetryPolicy,
}

impl Default for Sweep {
    fn default() -> Self {
        Self {
            page_size: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl Sweep {
    pub fn new(page_size: i64, retry: RetryPolicy) -> Self {
        Self { page_size, retry }
    }

    /// Fetch every page after `since`.
    pub async fn run<F: UpdateFeed + ?Sized>(
        &self,
        feed: &F,
        since: Option<Cursor>,
    ) -> Result<SweepReport> {
        let mut latest: HashMap<EntityId, EntityRecord> = HashMap::new();
        let mut report = SweepReport {
            latest: since.clone(),
            ..SweepReport::default()
        };
        let mut cursor = since;

        loop {
            let page = self
                .retry
                .run(|| feed.fetch(cursor.as_ref(), self.page_size))
                .await?;
            report.pages += 1;

            for record in page.decode_records()? {
                match latest.get(&record.id) {
                    Some(seen) if seen.revision > record.revision => {}
                    _ => {
                        latest.insert(record.id, record);
                    }
                }
            }
            if page.external_records_url.is_some() {
                report.external_records_url = page.external_records_url;
            }
            if page.latest_update.is_some() {
                report.latest = page.latest_update;
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut records: Vec<EntityRecord> = latest.into_values().collect();
        records.sort_by_key(|r| r.position());
        report.records = records;

        tracing::debug!(
            pages = report.pages,
            count = report.records.len(),
            "sweep complete"
        );
        Ok(report)
    }
}
