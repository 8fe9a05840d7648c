//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use deckhub_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated schema");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Key columns compare with SQLite's default BINARY collation, which orders
/// UTF-8 text bytewise, the same order `Position` uses.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE collections (
            collection_id TEXT PRIMARY KEY,    -- hyphenated UUID
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Entity change log: one row per entity at its latest revision
        CREATE TABLE entities (
            collection_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,           -- hyphenated UUID, also the tie-break key
            natural_key INTEGER NOT NULL,
            type_id INTEGER NOT NULL,
            fields BLOB NOT NULL,              -- CBOR array of {name, value}
            tags BLOB NOT NULL,                -- CBOR array of strings
            revision INTEGER NOT NULL,         -- Unix ms, store-assigned
            change_kind TEXT NOT NULL,         -- created | updated | deleted

            PRIMARY KEY (collection_id, entity_id),
            UNIQUE (collection_id, natural_key)
        );

        -- Media index
        CREATE TABLE media (
            collection_id TEXT NOT NULL,
            name TEXT NOT NULL,
            content_hash BLOB NOT NULL,        -- 32 bytes, Blake3
            modified_at INTEGER NOT NULL,
            present INTEGER NOT NULL,          -- 0 once deleted
            download_enabled INTEGER NOT NULL,

            PRIMARY KEY (collection_id, name)
        );

        -- Protection rules
        CREATE TABLE protected_fields (
            collection_id TEXT NOT NULL,
            type_id INTEGER NOT NULL,
            field_name TEXT NOT NULL,
            PRIMARY KEY (collection_id, type_id, field_name)
        );

        CREATE TABLE protected_tags (
            collection_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (collection_id, tag)
        );

        -- Extension overlays
        CREATE TABLE overlays (
            overlay_id INTEGER PRIMARY KEY,
            collection_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            tag_group_name TEXT NOT NULL
        );

        CREATE TABLE overlay_assignments (
            overlay_id INTEGER NOT NULL,
            entity_id TEXT NOT NULL,
            tags BLOB NOT NULL,                -- CBOR array of strings
            revision INTEGER NOT NULL,
            PRIMARY KEY (overlay_id, entity_id)
        );

        -- Bulk export snapshots
        CREATE TABLE exports (
            collection_id TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            revision INTEGER NOT NULL,
            sort_key TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection_id, storage_key)
        );

        -- Log-order indexes used by pagination
        CREATE INDEX idx_entities_log ON entities(collection_id, revision, entity_id);
        CREATE INDEX idx_media_log ON media(collection_id, modified_at, name);
        CREATE INDEX idx_assignments_log ON overlay_assignments(overlay_id, revision, entity_id);
        CREATE INDEX idx_overlays_collection ON overlays(collection_id);
        "#,
    )?;

    Ok(())
}
