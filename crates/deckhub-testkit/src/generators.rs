//! Proptest generators for property-based testing.

use proptest::prelude::*;

use deckhub_core::{EntityDraft, Field, RecordTypeId, Revision};

/// Generate a record type id from a small set, so types repeat.
pub fn record_type_id() -> impl Strategy<Value = RecordTypeId> {
    (1i64..=4).prop_map(RecordTypeId)
}

/// Generate a field name.
pub fn field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Front".to_string()),
        Just("Back".to_string()),
        Just("Notes".to_string()),
        "[A-Z][a-z]{0,11}".prop_map(String::from),
    ]
}

/// Generate a field with arbitrary unicode content.
pub fn field() -> impl Strategy<Value = Field> {
    (field_name(), "\\PC{0,40}").prop_map(|(name, value)| Field::new(name, value))
}

/// Generate a tag name.
pub fn tag() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_:]{0,15}".prop_map(String::from)
}

/// Generate a draft for a given natural key.
pub fn entity_draft(natural_key: i64) -> impl Strategy<Value = EntityDraft> {
    (
        record_type_id(),
        prop::collection::vec(field(), 0..4),
        prop::collection::btree_set(tag(), 0..3),
    )
        .prop_map(move |(type_id, fields, tags)| {
            let mut draft = EntityDraft::new(natural_key, type_id);
            draft.fields = fields;
            draft.tags = tags;
            draft
        })
}

/// Generate non-decreasing requested write times with frequent repeats.
pub fn revisions(max_len: usize) -> impl Strategy<Value = Vec<Revision>> {
    prop::collection::vec(0i64..3, 0..=max_len).prop_map(|steps| {
        steps
            .into_iter()
            .scan(1_000i64, |at, step| {
                *at += step;
                Some(*at)
            })
            .collect()
    })
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// One content-owner write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create or edit the entity with this natural key.
    Upsert { natural_key: i64 },
    /// Delete the entity with this natural key, if it exists.
    Delete { natural_key: i64 },
}

/// Generate a write sequence over a small key space, paired with its
/// non-decreasing write times.
pub fn write_ops(max_len: usize) -> impl Strategy<Value = Vec<(WriteOp, Revision)>> {
    let op = prop_oneof![
        3 => (0i64..12).prop_map(|natural_key| WriteOp::Upsert { natural_key }),
        1 => (0i64..12).prop_map(|natural_key| WriteOp::Delete { natural_key }),
    ];
    (prop::collection::vec(op, 0..=max_len), revisions(max_len)).prop_map(|(ops, revisions)| {
        ops.into_iter().zip(revisions).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_revisions_never_decrease(revs in revisions(50)) {
            prop_assert!(revs.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn test_drafts_keep_their_key(draft in entity_draft(7)) {
            prop_assert_eq!(draft.natural_key, 7);
            prop_assert!(draft.fields.len() < 4);
        }
    }
}
