//! Protection resolver.
//!
//! Protection rules are live configuration read from an explicitly passed
//! config store. They ride along with every page as page-shape metadata;
//! records themselves are never filtered or rewritten.

use deckhub_core::{normalize_names, CollectionId, ProtectionRules, RecordTypeId};
use deckhub_store::Store;

use crate::error::{Result, SyncError};

/// The protection rules currently in force for a collection.
pub async fn current_protection<S: Store + ?Sized>(
    config: &S,
    collection: &CollectionId,
) -> Result<ProtectionRules> {
    Ok(config.get_protection(collection).await?)
}

/// Replace the protected field names of one record type.
///
/// An empty set clears the type. Rules of other types and the tag set are
/// left as they are, even under concurrent setters. The change is visible
/// on the next page.
pub async fn set_protected_fields<S, I, N>(
    config: &S,
    collection: &CollectionId,
    type_id: RecordTypeId,
    names: I,
) -> Result<ProtectionRules>
where
    S: Store + ?Sized,
    I: IntoIterator<Item = N>,
    N: Into<String>,
{
    ensure_collection(config, collection).await?;
    let rules = config
        .replace_protected_fields(collection, type_id, normalize_names(names))
        .await?;

    tracing::info!(
        collection = %collection,
        type_id = %type_id,
        count = rules.fields_for(type_id).map_or(0, |f| f.len()),
        "protected fields replaced"
    );
    Ok(rules)
}

/// Replace the protected tag names of a collection.
pub async fn set_protected_tags<S, I, N>(
    config: &S,
    collection: &CollectionId,
    names: I,
) -> Result<ProtectionRules>
where
    S: Store + ?Sized,
    I: IntoIterator<Item = N>,
    N: Into<String>,
{
    ensure_collection(config, collection).await?;
    let rules = config
        .replace_protected_tags(collection, normalize_names(names))
        .await?;

    tracing::info!(
        collection = %collection,
        count = rules.tags().len(),
        "protected tags replaced"
    );
    Ok(rules)
}

async fn ensure_collection<S: Store + ?Sized>(store: &S, collection: &CollectionId) -> Result<()> {
    if store.collection_exists(collection).await? {
        Ok(())
    } else {
        Err(SyncError::CollectionNotFound(*collection))
    }
}
