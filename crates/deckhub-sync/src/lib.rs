//! # Deckhub Sync
//!
//! Incremental, cursor-based sync of a catalog's change logs.
//!
//! ## Overview
//!
//! A client holds a cursor per stream and asks for everything after it.
//! Every stream (entity records, media descriptors, overlay assignments) is
//! served by the same paginator over a [`PageSource`], so all of them share
//! one ordering and one cursor discipline.
//!
//! ## Key Properties
//!
//! - **No omission**: a sweep from no cursor delivers every record, for any
//!   page size
//! - **Tie-completion**: records sharing a revision never straddle a page
//!   boundary
//! - **Resumable**: no server-side session; a stale cursor simply resumes
//! - **Unforgeable cursors**: tokens carry a keyed mac, so only cursors the
//!   server issued for a stream resolve on it
//! - **Read-only**: page fetches never write, so retries are safe
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deckhub_core::{CollectionId, CursorKey, PageSize, PaginationLimits};
//! use deckhub_store::MemoryStore;
//! use deckhub_sync::get_page;
//!
//! async fn example(store: &MemoryStore, key: &CursorKey, collection: CollectionId) {
//!     let size = PageSize::new(500, &PaginationLimits::default()).unwrap();
//!     let mut since: Option<String> = None;
//!     loop {
//!         let page = get_page(store, key, &collection, since.as_deref(), size)
//!             .await
//!             .unwrap();
//!         // apply page.items ...
//!         match page.next {
//!             Some(next) => since = Some(next.to_token()),
//!             None => break,
//!         }
//!     }
//! }
//! ```
//!
//! ## Page Flow
//!
//! ```text
//! Client                              Server
//!   |-------- since=None, size=2 ----->|
//!   |<------- [n1, n2], next=c2 -------|
//!   |-------- since=c2, size=2 ------->|
//!   |<------- [n3], next=None ---------|
//! ```

pub mod error;
pub mod media;
pub mod overlay;
pub mod paginator;
pub mod protection;
pub mod source;

pub use error::{Result, SyncError};
pub use media::MediaIndex;
pub use overlay::OverlaySync;
pub use paginator::{get_page, paginate, Page};
pub use protection::{current_protection, set_protected_fields, set_protected_tags};
pub use source::{AssignmentLog, EntityLog, MediaLog, PageSource};
