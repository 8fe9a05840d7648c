//! Protection rules: fields and tags a client must not overwrite on sync.
//!
//! Rules describe the current state only. They are page-shape metadata
//! published next to the records; records themselves are never filtered.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::types::RecordTypeId;

/// Current protection configuration of one collection.
///
/// Invariants maintained by every constructor and mutator:
/// - no record type maps to an empty field set (the key is absent instead)
/// - no tag or field name is empty or whitespace-only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRules {
    fields_by_type: BTreeMap<RecordTypeId, BTreeSet<String>>,
    tags: BTreeSet<String>,
}

impl ProtectionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the protected field set for one record type.
    ///
    /// An empty set removes the type from the map.
    pub fn set_fields<I, S>(&mut self, type_id: RecordTypeId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = normalize_names(names);
        if names.is_empty() {
            self.fields_by_type.remove(&type_id);
        } else {
            self.fields_by_type.insert(type_id, names);
        }
    }

    /// Replace the protected tag set.
    pub fn set_tags<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_names(names);
    }

    pub fn fields_by_type(&self) -> &BTreeMap<RecordTypeId, BTreeSet<String>> {
        &self.fields_by_type
    }

    pub fn fields_for(&self, type_id: RecordTypeId) -> Option<&BTreeSet<String>> {
        self.fields_by_type.get(&type_id)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.fields_by_type.is_empty() && self.tags.is_empty()
    }

    /// Wire form of the field map: type ids as strings, names as sorted lists.
    pub fn fields_wire(&self) -> BTreeMap<String, Vec<String>> {
        self.fields_by_type
            .iter()
            .map(|(type_id, names)| (type_id.to_string(), names.iter().cloned().collect()))
            .collect()
    }

    /// Wire form of the tag set.
    pub fn tags_wire(&self) -> Vec<String> {
        self.tags.iter().cloned().collect()
    }
}

/// Drop blank names and deduplicate the rest.
pub fn normalize_names<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(Into::into)
        .filter(|n| !n.trim().is_empty())
        .collect()
}
