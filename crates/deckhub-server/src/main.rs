//! Deckhub sync server
//!
//! Serves incremental sync pages of shared collections over HTTP.
//!
//! Usage:
//!   deckhub-server --port 8080 --database deckhub.db --access access.json
//!
//! Cursors are signed with `--cursor-secret` (64 hex characters). Without
//! one a random secret is generated and outstanding cursors stop
//! resolving after a restart.
//!
//! The access file registers collections and bearer tokens with their
//! relations; without one the server starts with no credentials.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use deckhub::core::{now_millis, CollectionId, CursorKey, SubjectId};
use deckhub::perms::{AccessGrant, MemoryEntitlements, Relation, StaticIdentity};
use deckhub::store::{SqliteStore, Store};
use deckhub::{MemoryBlobStore, ServiceConfig, SyncService};
use deckhub_server::build_router;

#[derive(Parser, Debug)]
#[command(name = "deckhub-server")]
#[command(about = "Deckhub incremental sync server")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Path to the SQLite database
    #[arg(short, long, default_value = "deckhub.db")]
    database: PathBuf,

    /// JSON file with collections and access tokens
    #[arg(short, long)]
    access: Option<PathBuf>,

    /// Base URL signed blob URLs are issued under
    #[arg(long, default_value = "http://localhost:8080/blobs")]
    blob_base_url: String,

    /// Hex secret that signs pagination cursors
    #[arg(long)]
    cursor_secret: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct AccessFile {
    #[serde(default)]
    collections: Vec<CollectionEntry>,
    #[serde(default)]
    tokens: Vec<TokenEntry>,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    id: CollectionId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    token: String,
    subject: String,
    collection: CollectionId,
    relation: Relation,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .compact()
        .init();

    info!("Deckhub server starting...");
    let store = Arc::new(
        SqliteStore::open(&args.database)
            .with_context(|| format!("opening database {}", args.database.display()))?,
    );
    let identity = Arc::new(StaticIdentity::new());
    let entitlements = Arc::new(MemoryEntitlements::new());

    if let Some(path) = &args.access {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading access file {}", path.display()))?;
        let access: AccessFile = serde_json::from_str(&raw).context("parsing access file")?;
        load_access(store.as_ref(), &identity, &entitlements, access).await?;
    }

    let cursor_key = match &args.cursor_secret {
        Some(hex) => CursorKey::from_hex(hex).context("parsing --cursor-secret")?,
        None => {
            warn!("no cursor secret configured; cursors will not survive a restart");
            CursorKey::generate()
        }
    };

    let service = SyncService::new(
        store as Arc<dyn Store>,
        identity,
        entitlements,
        Arc::new(MemoryBlobStore::new(args.blob_base_url.clone())),
        ServiceConfig {
            cursor_key,
            ..ServiceConfig::default()
        },
    );
    let app = build_router(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .with_context(|| format!("binding port {}", args.port))?;
    info!(port = args.port, database = %args.database.display(), "listening");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

async fn load_access(
    store: &SqliteStore,
    identity: &StaticIdentity,
    entitlements: &MemoryEntitlements,
    access: AccessFile,
) -> Result<()> {
    let now = now_millis();
    for collection in &access.collections {
        store
            .create_collection(&collection.id, &collection.name, now)
            .await
            .with_context(|| format!("registering collection {}", collection.id))?;
    }
    for entry in access.tokens {
        let subject = SubjectId::new(entry.subject);
        identity.register(&entry.token, subject.clone())?;
        entitlements.grant(AccessGrant::new(subject, entry.collection, entry.relation))?;
    }
    info!(
        collections = access.collections.len(),
        "loaded access file"
    );
    Ok(())
}
