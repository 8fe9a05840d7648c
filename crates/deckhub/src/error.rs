//! Error types for the sync service.

use deckhub_core::{CodecError, CursorError, ValidationError};
use deckhub_perms::AccessError;
use deckhub_store::StoreError;
use deckhub_sync::SyncError;
use thiserror::Error;

use crate::blob::BlobError;

/// The kind of a service error.
///
/// Every error maps to exactly one kind; the kind decides the HTTP status
/// and whether a client may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or unknown credential. Retry only with a fresh credential.
    Unauthenticated,
    /// The subject may not access the resource. Never retried.
    Unauthorized,
    NotFound,
    /// Bad page size or cursor. Never silently corrected.
    Validation,
    /// A backend is temporarily unavailable. The only retryable kind.
    TransientStore,
    /// The payload could not be encoded. Fatal for the request.
    Codec,
    /// Anything else that went wrong on the server side.
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Unauthorized => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::TransientStore => 503,
            ErrorKind::Codec | ErrorKind::Internal => 500,
        }
    }

    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::TransientStore => "transient_store",
            ErrorKind::Codec => "codec",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors that can occur while serving sync requests.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    /// The identity or entitlement backend failed.
    #[error("access backend error: {0}")]
    AccessBackend(String),
}

impl ServiceError {
    /// The distinguishing kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            ServiceError::Store(e) if e.is_transient() => ErrorKind::TransientStore,
            ServiceError::Store(_) => ErrorKind::Internal,
            ServiceError::Codec(_) => ErrorKind::Codec,
            ServiceError::Blob(BlobError::Unavailable(_)) => ErrorKind::TransientStore,
            ServiceError::Blob(_) => ErrorKind::Internal,
            ServiceError::AccessBackend(_) => ErrorKind::TransientStore,
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStore
    }
}

impl From<SyncError> for ServiceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(e) => ServiceError::Validation(e),
            SyncError::Store(e) => ServiceError::Store(e),
            SyncError::CollectionNotFound(id) => {
                ServiceError::NotFound(format!("collection {}", id))
            }
            SyncError::OverlayNotFound(id) => ServiceError::NotFound(format!("overlay {}", id)),
        }
    }
}

impl From<AccessError> for ServiceError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthenticated(msg) => ServiceError::Unauthenticated(msg),
            AccessError::PermissionDenied(msg) => ServiceError::Unauthorized(msg),
            AccessError::Backend(msg) => ServiceError::AccessBackend(msg),
        }
    }
}

impl From<CursorError> for ServiceError {
    fn from(err: CursorError) -> Self {
        ServiceError::Validation(ValidationError::Cursor(err))
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
