//! Error types for the sync module.

use thiserror::Error;

use deckhub_core::{CollectionId, CursorError, OverlayId, ValidationError};

/// Errors that can occur while serving sync pages.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Page size or cursor rejected.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] deckhub_store::StoreError),

    /// The collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionId),

    /// The overlay does not exist.
    #[error("overlay not found: {0}")]
    OverlayNotFound(OverlayId),
}

impl From<CursorError> for SyncError {
    fn from(err: CursorError) -> Self {
        SyncError::Validation(ValidationError::Cursor(err))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
