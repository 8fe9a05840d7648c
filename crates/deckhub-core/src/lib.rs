//! # Deckhub Core
//!
//! Pure primitives for Deckhub sync: identifiers, records, cursors and the
//! payload codec.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the catalog data model.
//!
//! ## Key Types
//!
//! - [`EntityRecord`] - A structured content item with ordered fields and tags
//! - [`MediaRecord`] - Metadata of a binary asset, keyed by content hash
//! - [`OverlayAssignment`] - Tag-only annotation of an entity by an overlay
//! - [`ProtectionRules`] - Fields and tags clients must not overwrite
//! - [`Cursor`] - Opaque sync progress marker bound to one change log
//!
//! ## Codec
//!
//! Record pages are gzip-compressed and written with an 85-symbol printable
//! alphabet. See the [`codec`] module.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod media;
pub mod overlay;
pub mod protection;
pub mod record;
pub mod types;
pub mod validation;

pub use cursor::{Cursor, CursorKey, Paged, Position, StreamScope};
pub use error::{CodecError, CursorError, ValidationError};
pub use media::{ContentHash, MediaRecord, MediaUpsert};
pub use overlay::{Overlay, OverlayAssignment};
pub use protection::{normalize_names, ProtectionRules};
pub use record::{ChangeKind, EntityDraft, EntityRecord, Field};
pub use types::{now_millis, CollectionId, EntityId, OverlayId, RecordTypeId, Revision, SubjectId};
pub use validation::{resolve_cursor, PageSize, PaginationLimits, DEFAULT_MAX_PAGE_SIZE};
