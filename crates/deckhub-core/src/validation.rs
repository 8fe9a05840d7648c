//! Request validation: page sizes and cursors.
//!
//! Out-of-range values are rejected, never clamped.

use crate::cursor::{Cursor, CursorKey, Position, StreamScope};
use crate::error::ValidationError;

/// Default ceiling on the number of items a caller may request per page.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 2000;

/// Page size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub max_page_size: usize,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

/// A page size already checked against [`PaginationLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageSize(usize);

impl PageSize {
    /// Validate a requested page size.
    pub fn new(requested: i64, limits: &PaginationLimits) -> Result<Self, ValidationError> {
        if requested < 1 || requested as u64 > limits.max_page_size as u64 {
            return Err(ValidationError::PageSize {
                requested,
                max: limits.max_page_size,
            });
        }
        Ok(Self(requested as usize))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

/// Parse and resolve an optional cursor token for a stream.
///
/// `None` means a full sync from the start of the log.
pub fn resolve_cursor(
    token: Option<&str>,
    key: &CursorKey,
    scope: &StreamScope,
) -> Result<Option<Position>, ValidationError> {
    match token {
        None => Ok(None),
        Some(token) => {
            let cursor = Cursor::from_token(token)?;
            Ok(Some(cursor.resolve(key, scope)?.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CursorError;
    use crate::types::CollectionId;

    #[test]
    fn test_page_size_bounds() {
        let limits = PaginationLimits::default();
        assert!(PageSize::new(1, &limits).is_ok());
        assert!(PageSize::new(2000, &limits).is_ok());
        assert_eq!(
            PageSize::new(0, &limits),
            Err(ValidationError::PageSize {
                requested: 0,
                max: 2000
            })
        );
        assert!(PageSize::new(-3, &limits).is_err());
        assert!(PageSize::new(2001, &limits).is_err());
    }

    #[test]
    fn test_resolve_cursor() {
        let key = CursorKey::new([1u8; 32]);
        let collection = CollectionId::new();
        let scope = StreamScope::Entities(collection);
        assert_eq!(resolve_cursor(None, &key, &scope), Ok(None));

        let token = Cursor::issue(&key, &scope, Position::new(9, "x")).to_token();
        assert_eq!(
            resolve_cursor(Some(&token), &key, &scope),
            Ok(Some(Position::new(9, "x")))
        );

        let other = StreamScope::Media(collection);
        assert_eq!(
            resolve_cursor(Some(&token), &key, &other),
            Err(ValidationError::Cursor(CursorError::WrongStream))
        );
        assert_eq!(
            resolve_cursor(Some(&token), &CursorKey::new([2u8; 32]), &scope),
            Err(ValidationError::Cursor(CursorError::WrongStream))
        );
        assert!(resolve_cursor(Some("garbage"), &key, &scope).is_err());
    }
}
