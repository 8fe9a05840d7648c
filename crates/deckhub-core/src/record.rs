//! Entity records: the structured content items of a collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::cursor::{Paged, Position};
use crate::types::{CollectionId, EntityId, RecordTypeId, Revision};

/// What happened to an entity at its current revision.
///
/// A closed set so that client-side apply logic can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Stable string form, used by the SQLite backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ChangeKind::Created),
            "updated" => Some(ChangeKind::Updated),
            "deleted" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ChangeKind::Deleted)
    }
}

/// A single named field value. Field order within a record is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An entity record as it exists at its latest revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub collection_id: CollectionId,
    /// Externally-assigned numeric id, unique within the collection.
    pub natural_key: i64,
    pub type_id: RecordTypeId,
    pub fields: Vec<Field>,
    pub tags: BTreeSet<String>,
    pub revision: Revision,
    pub change_kind: ChangeKind,
}

impl EntityRecord {
    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

impl Paged for EntityRecord {
    fn position(&self) -> Position {
        Position::new(self.revision, self.id.sort_key())
    }
}

/// Content of an entity as written by a content owner, before the store
/// assigns a revision and change kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDraft {
    pub id: EntityId,
    pub natural_key: i64,
    pub type_id: RecordTypeId,
    pub fields: Vec<Field>,
    pub tags: BTreeSet<String>,
}

impl EntityDraft {
    pub fn new(natural_key: i64, type_id: RecordTypeId) -> Self {
        Self {
            id: EntityId::new(),
            natural_key,
            type_id,
            fields: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Materialize the draft at a given revision.
    pub fn into_record(
        self,
        collection_id: CollectionId,
        revision: Revision,
        change_kind: ChangeKind,
    ) -> EntityRecord {
        EntityRecord {
            id: self.id,
            collection_id,
            natural_key: self.natural_key,
            type_id: self.type_id,
            fields: self.fields,
            tags: self.tags,
            revision,
            change_kind,
        }
    }
}
