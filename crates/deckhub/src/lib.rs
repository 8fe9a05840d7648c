//! # Deckhub
//!
//! The sync service of Deckhub: incremental, cursor-based sync of shared
//! collections to many offline clients.
//!
//! ## Overview
//!
//! - **Entity pages**: records changed since a cursor, codec-encoded, with
//!   the collection's protection rules attached
//! - **Media pages**: the content-hash index of a collection's assets
//! - **Overlay pages**: tag assignments of an extension overlay, visible
//!   only to subscribers of the underlying collection
//! - **Bulk exports**: a first sync of a large collection is pointed at a
//!   pre-built export in the blob store
//!
//! Every request is authenticated and passes exactly one access decision
//! before any sync component runs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deckhub::{MemoryBlobStore, ServiceConfig, SyncService, UpdatesQuery};
//! use deckhub::perms::{MemoryEntitlements, StaticIdentity};
//! use deckhub::store::SqliteStore;
//! use deckhub::core::CollectionId;
//!
//! async fn example(token: &str, collection: CollectionId) {
//!     let store = Arc::new(SqliteStore::open("deckhub.db").unwrap());
//!     let service = SyncService::new(
//!         store,
//!         Arc::new(StaticIdentity::new()),
//!         Arc::new(MemoryEntitlements::new()),
//!         Arc::new(MemoryBlobStore::new("https://cdn.example")),
//!         ServiceConfig::default(),
//!     );
//!
//!     let page = service
//!         .collection_updates(token, &collection, &UpdatesQuery::default())
//!         .await
//!         .unwrap();
//!     let records = page.decode_records().unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `deckhub::core` - Identifiers, records, cursors and the codec
//! - `deckhub::store` - Storage abstraction, in-memory and SQLite
//! - `deckhub::sync` - Paginator, protection, media index, overlays
//! - `deckhub::perms` - Relations, grants and the access decision

pub mod blob;
pub mod error;
pub mod retry;
pub mod service;
pub mod sweep;

// Re-export component crates
pub use deckhub_core as core;
pub use deckhub_perms as perms;
pub use deckhub_store as store;
pub use deckhub_sync as sync;

pub use blob::{media_key, BlobError, BlobStore, MemoryBlobStore, SignedUrl};
pub use error::{ErrorKind, Result, ServiceError};
pub use retry::RetryPolicy;
pub use service::{
    AssignmentEntry, AssignmentsPage, MediaDescriptor, MediaPage, PageQuery, ProtectedFields,
    ProtectedTags, ServiceConfig, SyncService, UpdatesPage, UpdatesQuery,
};
pub use sweep::{CollectionFeed, Sweep, SweepReport, UpdateFeed};

pub use deckhub_core::{CollectionId, Cursor, EntityRecord, OverlayId};
