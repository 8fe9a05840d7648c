//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur during authentication and authorization.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No credential, or one the identity provider does not recognize.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The subject is known but may not access the resource.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The identity or entitlement backend failed.
    #[error("access backend error: {0}")]
    Backend(String),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, AccessError>;
