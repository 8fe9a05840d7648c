//! Grant state.
//!
//! Grants are indexed by `(subject, collection)`. Revocation marks a grant
//! instead of removing it, so the history of a relation stays visible.

use std::collections::HashMap;

use deckhub_core::{CollectionId, SubjectId};

use crate::grant::{AccessGrant, Relation};

/// All grants known to an entitlement source.
#[derive(Debug, Default, Clone)]
pub struct GrantSet {
    by_subject: HashMap<(SubjectId, CollectionId), Vec<AccessGrant>>,
}

impl GrantSet {
    /// Create a new empty grant set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant.
    pub fn add(&mut self, grant: AccessGrant) {
        self.by_subject
            .entry((grant.subject.clone(), grant.collection))
            .or_default()
            .push(grant);
    }

    /// Revoke every active grant of `relation` held by `subject` on
    /// `collection`. Returns how many grants were revoked.
    pub fn revoke(
        &mut self,
        subject: &SubjectId,
        collection: &CollectionId,
        relation: Relation,
        at: i64,
    ) -> usize {
        let Some(grants) = self.by_subject.get_mut(&(subject.clone(), *collection)) else {
            return 0;
        };

        let mut revoked = 0;
        for grant in grants
            .iter_mut()
            .filter(|g| g.relation == relation && g.revoked_at.is_none())
        {
            grant.revoked_at = Some(at);
            revoked += 1;
        }
        revoked
    }

    /// All grants held by `subject` on `collection`, active or not.
    pub fn grants_for(&self, subject: &SubjectId, collection: &CollectionId) -> &[AccessGrant] {
        self.by_subject
            .get(&(subject.clone(), *collection))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Grants held by `subject` on `collection` that are active at `now`.
    pub fn active_grants_for(
        &self,
        subject: &SubjectId,
        collection: &CollectionId,
        now: i64,
    ) -> Vec<&AccessGrant> {
        self.grants_for(subject, collection)
            .iter()
            .filter(|g| g.is_active(now))
            .collect()
    }
}
