//! Access grants.
//!
//! A grant relates a subject to a collection. Overlays do not carry grants
//! of their own; access to an overlay follows the subject's relation to the
//! overlay's underlying collection.

use serde::{Deserialize, Serialize};

use deckhub_core::{CollectionId, SubjectId};

/// How a subject relates to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Created the collection.
    Owner,
    /// May edit content and configuration.
    Maintainer,
    /// Subscribed to the collection and its updates.
    Subscriber,
    /// General read access, e.g. through a purchase.
    Reader,
}

impl Relation {
    /// Whether this relation allows reading the collection's own streams.
    pub fn can_read(&self) -> bool {
        true
    }

    /// Whether this relation allows reading extension overlays.
    ///
    /// Plain read access is not enough.
    pub fn can_read_overlays(&self) -> bool {
        matches!(
            self,
            Relation::Owner | Relation::Maintainer | Relation::Subscriber
        )
    }

    /// Whether this relation allows changing content or configuration.
    pub fn can_maintain(&self) -> bool {
        matches!(self, Relation::Owner | Relation::Maintainer)
    }
}

/// A grant of a relation to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub subject: SubjectId,
    pub collection: CollectionId,
    pub relation: Relation,

    /// When the grant expires (Unix milliseconds).
    pub expires_at: Option<i64>,

    /// When the grant was revoked (Unix milliseconds), if it was.
    pub revoked_at: Option<i64>,
}

impl AccessGrant {
    /// Create an open-ended grant.
    pub fn new(subject: SubjectId, collection: CollectionId, relation: Relation) -> Self {
        Self {
            subject,
            collection,
            relation,
            expires_at: None,
            revoked_at: None,
        }
    }

    /// Set an expiration time.
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.expires_at = Some(timestamp);
        self
    }

    /// Check if this grant is currently active.
    pub fn is_active(&self, now: i64) -> bool {
        if let Some(revoked) = self.revoked_at {
            if now >= revoked {
                return false;
            }
        }
        if let Some(expires) = self.expires_at {
            if now > expires {
                return false;
            }
        }
        true
    }
}
