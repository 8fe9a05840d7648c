//! Extension overlays: optional tag-only layers on top of a collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::cursor::{Paged, Position};
use crate::types::{CollectionId, EntityId, OverlayId, Revision, SubjectId};

/// An overlay attached to a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: OverlayId,
    /// The underlying collection whose entities the overlay annotates.
    pub collection_id: CollectionId,
    pub owner_id: SubjectId,
    pub name: String,
    /// Tag group under which clients file the overlay's tags.
    pub tag_group_name: String,
}

/// The tags an overlay assigns to one entity, at its latest revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayAssignment {
    pub overlay_id: OverlayId,
    pub entity_id: EntityId,
    pub tags: BTreeSet<String>,
    pub revision: Revision,
}

impl Paged for OverlayAssignment {
    fn position(&self) -> Position {
        Position::new(self.revision, self.entity_id.sort_key())
    }
}
