//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Deckhub. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use deckhub_core::{
    normalize_names, ChangeKind, CollectionId, ContentHash, EntityDraft, EntityId, EntityRecord,
    Field, MediaRecord, MediaUpsert, Overlay, OverlayAssignment, OverlayId, Position,
    ProtectionRules, RecordTypeId, Revision, SubjectId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ExportSnapshot, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn conversion_error(idx: usize, ty: Type, message: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into().into())
}

fn encode_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(idx: usize, bytes: &[u8]) -> rusqlite::Result<T> {
    ciborium::from_reader(bytes).map_err(|e| conversion_error(idx, Type::Blob, e.to_string()))
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRecord> {
    let collection_id: String = row.get(0)?;
    let entity_id: String = row.get(1)?;
    let fields: Vec<u8> = row.get(4)?;
    let tags: Vec<u8> = row.get(5)?;
    let change_kind: String = row.get(7)?;

    Ok(EntityRecord {
        collection_id: collection_id
            .parse()
            .map_err(|_| conversion_error(0, Type::Text, "collection_id is not a UUID"))?,
        id: entity_id
            .parse()
            .map_err(|_| conversion_error(1, Type::Text, "entity_id is not a UUID"))?,
        natural_key: row.get(2)?,
        type_id: RecordTypeId(row.get(3)?),
        fields: decode_cbor::<Vec<Field>>(4, &fields)?,
        tags: decode_cbor::<BTreeSet<String>>(5, &tags)?,
        revision: row.get(6)?,
        change_kind: ChangeKind::parse(&change_kind)
            .ok_or_else(|| conversion_error(7, Type::Text, "unknown change kind"))?,
    })
}

const ENTITY_COLUMNS: &str =
    "collection_id, entity_id, natural_key, type_id, fields, tags, revision, change_kind";

fn row_to_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaRecord> {
    let hash: Vec<u8> = row.get(1)?;
    let hash: [u8; 32] = hash
        .try_into()
        .map_err(|_| conversion_error(1, Type::Blob, "content_hash must be 32 bytes"))?;

    Ok(MediaRecord {
        name: row.get(0)?,
        content_hash: ContentHash(hash),
        modified_at: row.get(2)?,
        exists: row.get(3)?,
        download_enabled: row.get(4)?,
    })
}

const MEDIA_COLUMNS: &str = "name, content_hash, modified_at, present, download_enabled";

fn row_to_overlay(row: &rusqlite::Row<'_>) -> rusqlite::Result<Overlay> {
    let collection_id: String = row.get(1)?;
    Ok(Overlay {
        id: OverlayId(row.get::<_, i64>(0)? as u64),
        collection_id: collection_id
            .parse()
            .map_err(|_| conversion_error(1, Type::Text, "collection_id is not a UUID"))?,
        owner_id: SubjectId(row.get(2)?),
        name: row.get(3)?,
        tag_group_name: row.get(4)?,
    })
}

const OVERLAY_COLUMNS: &str = "overlay_id, collection_id, owner_id, name, tag_group_name";

fn row_to_assignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<OverlayAssignment> {
    let entity_id: String = row.get(1)?;
    let tags: Vec<u8> = row.get(2)?;
    Ok(OverlayAssignment {
        overlay_id: OverlayId(row.get::<_, i64>(0)? as u64),
        entity_id: entity_id
            .parse()
            .map_err(|_| conversion_error(1, Type::Text, "entity_id is not a UUID"))?,
        tags: decode_cbor(2, &tags)?,
        revision: row.get(3)?,
    })
}

const ASSIGNMENT_COLUMNS: &str = "overlay_id, entity_id, tags, revision";

fn require_collection(conn: &Connection, id: &str) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM collections WHERE collection_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("collection {}", id))),
    }
}

/// `at` if it is past the newest revision in the log, `newest + 1` otherwise,
/// given a MAX() query over the log.
fn next_revision(
    conn: &Connection,
    sql: &str,
    scope: impl rusqlite::ToSql,
    at: Revision,
) -> Result<Revision> {
    let newest: Option<i64> = conn.query_row(sql, params![scope], |row| row.get(0))?;
    Ok(match newest {
        Some(newest) if at <= newest => newest + 1,
        _ => at,
    })
}

const NEWEST_ENTITY_SQL: &str = "SELECT MAX(revision) FROM entities WHERE collection_id = ?1";

/// Insert or replace one entity at `revision` inside an open transaction.
fn write_entity(
    tx: &Connection,
    collection: CollectionId,
    collection_key: &str,
    draft: EntityDraft,
    revision: Revision,
) -> Result<EntityRecord> {
    let entity_key = draft.id.sort_key();

    let owner: Option<String> = tx
        .query_row(
            "SELECT entity_id FROM entities WHERE collection_id = ?1 AND natural_key = ?2",
            params![collection_key, draft.natural_key],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(owner) = owner {
        if owner != entity_key {
            return Err(StoreError::Conflict(format!(
                "natural key {} already belongs to {}",
                draft.natural_key, owner
            )));
        }
    }

    let previous: Option<String> = tx
        .query_row(
            "SELECT change_kind FROM entities WHERE collection_id = ?1 AND entity_id = ?2",
            params![collection_key, entity_key],
            |row| row.get(0),
        )
        .optional()?;
    let change_kind = match previous.as_deref().and_then(ChangeKind::parse) {
        Some(kind) if !kind.is_deleted() => ChangeKind::Updated,
        _ => ChangeKind::Created,
    };

    let record = draft.into_record(collection, revision, change_kind);
    tx.execute(
        "INSERT INTO entities (
            collection_id, entity_id, natural_key, type_id, fields, tags,
            revision, change_kind
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(collection_id, entity_id) DO UPDATE SET
            natural_key = excluded.natural_key,
            type_id = excluded.type_id,
            fields = excluded.fields,
            tags = excluded.tags,
            revision = excluded.revision,
            change_kind = excluded.change_kind",
        params![
            collection_key,
            entity_key,
            record.natural_key,
            record.type_id.0,
            encode_cbor(&record.fields)?,
            encode_cbor(&record.tags)?,
            record.revision,
            record.change_kind.as_str(),
        ],
    )?;
    Ok(record)
}

fn read_protection(conn: &Connection, collection_key: &str) -> Result<ProtectionRules> {
    let mut by_type: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT type_id, field_name FROM protected_fields WHERE collection_id = ?1")?;
    let rows = stmt.query_map(params![collection_key], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (type_id, name) = row?;
        by_type.entry(type_id).or_default().push(name);
    }

    let mut stmt = conn.prepare("SELECT tag FROM protected_tags WHERE collection_id = ?1")?;
    let tags = stmt
        .query_map(params![collection_key], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut rules = ProtectionRules::new();
    for (type_id, names) in by_type {
        rules.set_fields(RecordTypeId(type_id), names);
    }
    rules.set_tags(tags);
    Ok(rules)
}

fn overlay_key(id: &OverlayId) -> i64 {
    id.0 as i64
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_collection(&self, id: &CollectionId, name: &str, at: i64) -> Result<()> {
        let id = id.to_string();
        let name = name.to_string();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO collections (collection_id, name, created_at)
                 VALUES (?1, ?2, ?3)",
                params![id, name, at],
            )?;
            Ok(())
        })
        .await
    }

    async fn collection_exists(&self, id: &CollectionId) -> Result<bool> {
        let id = id.to_string();

        self.run(move |conn| match require_collection(conn, &id) {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        })
        .await
    }

    async fn entity_count(&self, id: &CollectionId) -> Result<u64> {
        let id = id.to_string();

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entities WHERE collection_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn upsert_entity(
        &self,
        collection: &CollectionId,
        draft: EntityDraft,
        at: Revision,
    ) -> Result<EntityRecord> {
        let collection = *collection;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let collection_key = collection.to_string();
            require_collection(&tx, &collection_key)?;

            let revision = next_revision(&tx, NEWEST_ENTITY_SQL, &collection_key, at)?;
            let record = write_entity(&tx, collection, &collection_key, draft, revision)?;

            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn upsert_entities(
        &self,
        collection: &CollectionId,
        drafts: Vec<EntityDraft>,
        at: Revision,
    ) -> Result<Vec<EntityRecord>> {
        let collection = *collection;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let collection_key = collection.to_string();
            require_collection(&tx, &collection_key)?;
            if drafts.is_empty() {
                return Ok(Vec::new());
            }

            let revision = next_revision(&tx, NEWEST_ENTITY_SQL, &collection_key, at)?;
            let records = drafts
                .into_iter()
                .map(|draft| write_entity(&tx, collection, &collection_key, draft, revision))
                .collect::<Result<Vec<_>>>()?;

            tx.commit()?;
            Ok(records)
        })
        .await
    }

    async fn delete_entity(
        &self,
        collection: &CollectionId,
        id: &EntityId,
        at: Revision,
    ) -> Result<Option<EntityRecord>> {
        let collection_key = collection.to_string();
        let entity_key = id.sort_key();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection_key)?;

            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM entities WHERE collection_id = ?1 AND entity_id = ?2",
                        ENTITY_COLUMNS
                    ),
                    params![collection_key, entity_key],
                    row_to_entity,
                )
                .optional()?;
            let Some(existing) = existing else {
                return Ok(None);
            };
            if existing.change_kind.is_deleted() {
                return Ok(Some(existing));
            }

            let revision = next_revision(&tx, NEWEST_ENTITY_SQL, &collection_key, at)?;
            tx.execute(
                "UPDATE entities SET revision = ?3, change_kind = ?4
                 WHERE collection_id = ?1 AND entity_id = ?2",
                params![
                    collection_key,
                    entity_key,
                    revision,
                    ChangeKind::Deleted.as_str()
                ],
            )?;
            tx.commit()?;

            Ok(Some(EntityRecord {
                revision,
                change_kind: ChangeKind::Deleted,
                ..existing
            }))
        })
        .await
    }

    async fn get_entity(
        &self,
        collection: &CollectionId,
        id: &EntityId,
    ) -> Result<Option<EntityRecord>> {
        let collection_key = collection.to_string();
        let entity_key = id.sort_key();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM entities WHERE collection_id = ?1 AND entity_id = ?2",
                    ENTITY_COLUMNS
                ),
                params![collection_key, entity_key],
                row_to_entity,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn entities_after(
        &self,
        collection: &CollectionId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<EntityRecord>> {
        let collection_key = collection.to_string();
        let after_revision = after.map(|p| p.revision);
        let after_key = after.map(|p| p.key.clone()).unwrap_or_default();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM entities
                 WHERE collection_id = ?1
                   AND (?2 IS NULL OR revision > ?2 OR (revision = ?2 AND entity_id > ?3))
                 ORDER BY revision, entity_id
                 LIMIT ?4",
                ENTITY_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![collection_key, after_revision, after_key, limit as i64],
                row_to_entity,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn entities_at(
        &self,
        collection: &CollectionId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<EntityRecord>> {
        let collection_key = collection.to_string();
        let after_key = after_key.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM entities
                 WHERE collection_id = ?1 AND revision = ?2 AND entity_id > ?3
                 ORDER BY entity_id",
                ENTITY_COLUMNS
            ))?;
            let rows = stmt.query_map(params![collection_key, revision, after_key], row_to_entity)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn upsert_media(
        &self,
        collection: &CollectionId,
        name: &str,
        hash: ContentHash,
        at: Revision,
    ) -> Result<MediaUpsert> {
        let collection_key = collection.to_string();
        let name = name.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection_key)?;

            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM media WHERE collection_id = ?1 AND name = ?2",
                        MEDIA_COLUMNS
                    ),
                    params![collection_key, name],
                    row_to_media,
                )
                .optional()?;

            let (outcome, download_enabled) = match existing {
                None => (MediaUpsert::Created, true),
                Some(existing) if existing.exists && existing.content_hash == hash => {
                    return Ok(MediaUpsert::Unchanged);
                }
                Some(existing) => (MediaUpsert::Replaced, existing.download_enabled),
            };

            let modified_at = next_revision(
                &tx,
                "SELECT MAX(modified_at) FROM media WHERE collection_id = ?1",
                &collection_key,
                at,
            )?;
            tx.execute(
                "INSERT INTO media (
                    collection_id, name, content_hash, modified_at, present, download_enabled
                ) VALUES (?1, ?2, ?3, ?4, 1, ?5)
                ON CONFLICT(collection_id, name) DO UPDATE SET
                    content_hash = excluded.content_hash,
                    modified_at = excluded.modified_at,
                    present = 1,
                    download_enabled = excluded.download_enabled",
                params![
                    collection_key,
                    name,
                    hash.0.as_slice(),
                    modified_at,
                    download_enabled
                ],
            )?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn delete_media(
        &self,
        collection: &CollectionId,
        name: &str,
        at: Revision,
    ) -> Result<bool> {
        let collection_key = collection.to_string();
        let name = name.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection_key)?;

            let present: Option<bool> = tx
                .query_row(
                    "SELECT present FROM media WHERE collection_id = ?1 AND name = ?2",
                    params![collection_key, name],
                    |row| row.get(0),
                )
                .optional()?;
            if present != Some(true) {
                return Ok(false);
            }

            let modified_at = next_revision(
                &tx,
                "SELECT MAX(modified_at) FROM media WHERE collection_id = ?1",
                &collection_key,
                at,
            )?;
            tx.execute(
                "UPDATE media SET present = 0, modified_at = ?3
                 WHERE collection_id = ?1 AND name = ?2",
                params![collection_key, name, modified_at],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn set_media_download_enabled(
        &self,
        collection: &CollectionId,
        name: &str,
        enabled: bool,
        at: Revision,
    ) -> Result<bool> {
        let collection_key = collection.to_string();
        let name = name.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection_key)?;

            let current: Option<bool> = tx
                .query_row(
                    "SELECT download_enabled FROM media WHERE collection_id = ?1 AND name = ?2",
                    params![collection_key, name],
                    |row| row.get(0),
                )
                .optional()?;
            match current {
                None => return Ok(false),
                Some(current) if current == enabled => return Ok(true),
                Some(_) => {}
            }

            let modified_at = next_revision(
                &tx,
                "SELECT MAX(modified_at) FROM media WHERE collection_id = ?1",
                &collection_key,
                at,
            )?;
            tx.execute(
                "UPDATE media SET download_enabled = ?3, modified_at = ?4
                 WHERE collection_id = ?1 AND name = ?2",
                params![collection_key, name, enabled, modified_at],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn get_media(
        &self,
        collection: &CollectionId,
        name: &str,
    ) -> Result<Option<MediaRecord>> {
        let collection_key = collection.to_string();
        let name = name.to_string();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM media WHERE collection_id = ?1 AND name = ?2",
                    MEDIA_COLUMNS
                ),
                params![collection_key, name],
                row_to_media,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn media_after(
        &self,
        collection: &CollectionId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<MediaRecord>> {
        let collection_key = collection.to_string();
        let after_revision = after.map(|p| p.revision);
        let after_key = after.map(|p| p.key.clone()).unwrap_or_default();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM media
                 WHERE collection_id = ?1
                   AND (?2 IS NULL OR modified_at > ?2 OR (modified_at = ?2 AND name > ?3))
                 ORDER BY modified_at, name
                 LIMIT ?4",
                MEDIA_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![collection_key, after_revision, after_key, limit as i64],
                row_to_media,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn media_at(
        &self,
        collection: &CollectionId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<MediaRecord>> {
        let collection_key = collection.to_string();
        let after_key = after_key.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM media
                 WHERE collection_id = ?1 AND modified_at = ?2 AND name > ?3
                 ORDER BY name",
                MEDIA_COLUMNS
            ))?;
            let rows = stmt.query_map(params![collection_key, revision, after_key], row_to_media)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn get_protection(&self, collection: &CollectionId) -> Result<ProtectionRules> {
        let collection_key = collection.to_string();

        self.run(move |conn| read_protection(conn, &collection_key)).await
    }

    async fn replace_protected_fields(
        &self,
        collection: &CollectionId,
        type_id: RecordTypeId,
        names: BTreeSet<String>,
    ) -> Result<ProtectionRules> {
        let collection_key = collection.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection_key)?;

            tx.execute(
                "DELETE FROM protected_fields WHERE collection_id = ?1 AND type_id = ?2",
                params![collection_key, type_id.0],
            )?;
            for name in normalize_names(names) {
                tx.execute(
                    "INSERT INTO protected_fields (collection_id, type_id, field_name)
                     VALUES (?1, ?2, ?3)",
                    params![collection_key, type_id.0, name],
                )?;
            }

            let rules = read_protection(&tx, &collection_key)?;
            tx.commit()?;
            Ok(rules)
        })
        .await
    }

    async fn replace_protected_tags(
        &self,
        collection: &CollectionId,
        tags: BTreeSet<String>,
    ) -> Result<ProtectionRules> {
        let collection_key = collection.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection_key)?;

            tx.execute(
                "DELETE FROM protected_tags WHERE collection_id = ?1",
                params![collection_key],
            )?;
            for tag in normalize_names(tags) {
                tx.execute(
                    "INSERT INTO protected_tags (collection_id, tag) VALUES (?1, ?2)",
                    params![collection_key, tag],
                )?;
            }

            let rules = read_protection(&tx, &collection_key)?;
            tx.commit()?;
            Ok(rules)
        })
        .await
    }

    async fn upsert_overlay(&self, overlay: &Overlay) -> Result<()> {
        let overlay = overlay.clone();

        self.run(move |conn| {
            let collection_key = overlay.collection_id.to_string();
            require_collection(conn, &collection_key)?;

            conn.execute(
                "INSERT INTO overlays (overlay_id, collection_id, owner_id, name, tag_group_name)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(overlay_id) DO UPDATE SET
                    collection_id = excluded.collection_id,
                    owner_id = excluded.owner_id,
                    name = excluded.name,
                    tag_group_name = excluded.tag_group_name",
                params![
                    overlay_key(&overlay.id),
                    collection_key,
                    overlay.owner_id.as_str(),
                    overlay.name,
                    overlay.tag_group_name,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_overlay(&self, id: &OverlayId) -> Result<Option<Overlay>> {
        let id = overlay_key(id);

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM overlays WHERE overlay_id = ?1", OVERLAY_COLUMNS),
                params![id],
                row_to_overlay,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_overlays(&self, collection: &CollectionId) -> Result<Vec<Overlay>> {
        let collection_key = collection.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM overlays WHERE collection_id = ?1 ORDER BY overlay_id",
                OVERLAY_COLUMNS
            ))?;
            let rows = stmt.query_map(params![collection_key], row_to_overlay)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn assign_overlay_tags(
        &self,
        overlay: &OverlayId,
        entity: &EntityId,
        tags: BTreeSet<String>,
        at: Revision,
    ) -> Result<OverlayAssignment> {
        let overlay = *overlay;
        let entity = *entity;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let found: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM overlays WHERE overlay_id = ?1",
                    params![overlay_key(&overlay)],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_none() {
                return Err(StoreError::NotFound(format!("overlay {}", overlay)));
            }

            let revision = next_revision(
                &tx,
                "SELECT MAX(revision) FROM overlay_assignments WHERE overlay_id = ?1",
                overlay_key(&overlay),
                at,
            )?;
            tx.execute(
                "INSERT INTO overlay_assignments (overlay_id, entity_id, tags, revision)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(overlay_id, entity_id) DO UPDATE SET
                    tags = excluded.tags,
                    revision = excluded.revision",
                params![
                    overlay_key(&overlay),
                    entity.sort_key(),
                    encode_cbor(&tags)?,
                    revision
                ],
            )?;
            tx.commit()?;

            Ok(OverlayAssignment {
                overlay_id: overlay,
                entity_id: entity,
                tags,
                revision,
            })
        })
        .await
    }

    async fn assignments_after(
        &self,
        overlay: &OverlayId,
        after: Option<&Position>,
        limit: usize,
    ) -> Result<Vec<OverlayAssignment>> {
        let overlay = overlay_key(overlay);
        let after_revision = after.map(|p| p.revision);
        let after_key = after.map(|p| p.key.clone()).unwrap_or_default();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM overlay_assignments
                 WHERE overlay_id = ?1
                   AND (?2 IS NULL OR revision > ?2 OR (revision = ?2 AND entity_id > ?3))
                 ORDER BY revision, entity_id
                 LIMIT ?4",
                ASSIGNMENT_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![overlay, after_revision, after_key, limit as i64],
                row_to_assignment,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn assignments_at(
        &self,
        overlay: &OverlayId,
        revision: Revision,
        after_key: &str,
    ) -> Result<Vec<OverlayAssignment>> {
        let overlay = overlay_key(overlay);
        let after_key = after_key.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM overlay_assignments
                 WHERE overlay_id = ?1 AND revision = ?2 AND entity_id > ?3
                 ORDER BY entity_id",
                ASSIGNMENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![overlay, revision, after_key], row_to_assignment)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn record_export(
        &self,
        collection: &CollectionId,
        snapshot: &ExportSnapshot,
    ) -> Result<()> {
        let collection_key = collection.to_string();
        let snapshot = snapshot.clone();

        self.run(move |conn| {
            require_collection(conn, &collection_key)?;
            conn.execute(
                "INSERT OR REPLACE INTO exports (
                    collection_id, storage_key, revision, sort_key, record_count, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    collection_key,
                    snapshot.storage_key,
                    snapshot.position.revision,
                    snapshot.position.key,
                    snapshot.record_count as i64,
                    snapshot.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_export(&self, collection: &CollectionId) -> Result<Option<ExportSnapshot>> {
        let collection_key = collection.to_string();

        self.run(move |conn| {
            conn.query_row(
                "SELECT storage_key, revision, sort_key, record_count, created_at
                 FROM exports WHERE collection_id = ?1
                 ORDER BY revision DESC, sort_key DESC
                 LIMIT 1",
                params![collection_key],
                |row| {
                    Ok(ExportSnapshot {
                        storage_key: row.get(0)?,
                        position: Position::new(row.get(1)?, row.get::<_, String>(2)?),
                        record_count: row.get::<_, i64>(3)? as u64,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }
}
