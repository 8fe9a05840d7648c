//! # Deckhub Store
//!
//! Storage abstraction for Deckhub. Provides a trait-based interface for
//! catalog persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts the change logs of a catalog (entities, media,
//! overlay assignments) plus protection rules and export snapshots behind the
//! [`Store`] trait. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`ExportSnapshot`] - Pointer to a bulk export of a collection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deckhub_store::{SqliteStore, Store};
//! use deckhub_core::{CollectionId, EntityDraft, RecordTypeId};
//!
//! async fn example() {
//!     let store = SqliteStore::open("deckhub.db").unwrap();
//!
//!     let collection = CollectionId::new();
//!     store.create_collection(&collection, "Anatomy", 0).await.unwrap();
//!
//!     let draft = EntityDraft::new(1, RecordTypeId(1)).field("Front", "Femur");
//!     let record = store.upsert_entity(&collection, draft, 1_000).await.unwrap();
//!     assert_eq!(record.revision, 1_000);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Monotonic revisions**: writes never move a log backwards
//! - **Deletes are changes**: tombstones stay in the log
//! - **Media dedup**: identical re-uploads leave the index untouched

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ExportSnapshot, Store};
