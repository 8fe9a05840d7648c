//! The single authorization decision point.
//!
//! [`check_access`] is a pure function of the subject, the resource and the
//! subject's grants on the resource's collection. The service resolves the
//! grants and calls it once per request, before any sync component runs.

use deckhub_core::{CollectionId, OverlayId, SubjectId};

use crate::grant::{AccessGrant, Relation};

/// Something a subject may try to access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// A collection's entity, media and protection streams.
    Collection(CollectionId),
    /// An extension overlay of a collection.
    Overlay {
        id: OverlayId,
        collection: CollectionId,
    },
    /// Content and configuration changes on a collection.
    Maintenance(CollectionId),
}

impl Resource {
    /// The collection whose grants decide access.
    pub fn collection(&self) -> CollectionId {
        match self {
            Resource::Collection(id) | Resource::Maintenance(id) => *id,
            Resource::Overlay { collection, .. } => *collection,
        }
    }

    fn permits(&self, relation: Relation) -> bool {
        match self {
            Resource::Collection(_) => relation.can_read(),
            Resource::Overlay { .. } => relation.can_read_overlays(),
            Resource::Maintenance(_) => relation.can_maintain(),
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Access allowed through the given relation.
    Allowed(Relation),
    Denied,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed(_))
    }
}

/// Decide whether `subject` may access `resource`.
///
/// Only grants held by `subject` on the resource's collection and active at
/// `now` count. When several grants qualify the strongest relation is
/// reported.
pub fn check_access(
    subject: &SubjectId,
    resource: &Resource,
    grants: &[AccessGrant],
    now: i64,
) -> AccessDecision {
    let collection = resource.collection();
    grants
        .iter()
        .filter(|g| g.subject == *subject && g.collection == collection)
        .filter(|g| g.is_active(now))
        .map(|g| g.relation)
        .filter(|r| resource.permits(*r))
        .min()
        .map_or(AccessDecision::Denied, AccessDecision::Allowed)
}
