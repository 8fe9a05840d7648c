use std::sync::Arc;

use deckhub::core::{
    codec, CollectionId, ContentHash, EntityDraft, EntityRecord, Overlay, OverlayId,
    RecordTypeId, SubjectId,
};
use deckhub::perms::{AccessGrant, MemoryEntitlements, Relation, StaticIdentity};
use deckhub::store::{MemoryStore, Store};
use deckhub::{MediaPage, MemoryBlobStore, ServiceConfig, SyncService, UpdatesPage};
use deckhub_server::{build_router, ErrorResponse, OverlaySummary};

struct TestServer {
    base: String,
    store: Arc<MemoryStore>,
    collection: CollectionId,
}

/// Spin up the HTTP server on an OS-assigned port.
///
/// Tokens: `owner-token` (Owner), `reader-token` (Reader),
/// `subscriber-token` (Subscriber).
async fn spawn_test_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let collection = CollectionId::new();
    store
        .create_collection(&collection, "Biology", 0)
        .await
        .unwrap();

    let identity = Arc::new(StaticIdentity::new());
    let entitlements = Arc::new(MemoryEntitlements::new());
    for (token, relation) in [
        ("owner-token", Relation::Owner),
        ("reader-token", Relation::Reader),
        ("subscriber-token", Relation::Subscriber),
    ] {
        let subject = SubjectId::new(token.trim_end_matches("-token"));
        identity.register(token, subject.clone()).unwrap();
        entitlements
            .grant(AccessGrant::new(subject, collection, relation))
            .unwrap();
    }

    let service = SyncService::new(
        store.clone() as Arc<dyn Store>,
        identity,
        entitlements,
        Arc::new(MemoryBlobStore::new("https://cdn.test")),
        ServiceConfig::default(),
    );
    let app = build_router(Arc::new(service));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        store,
        collection,
    }
}

async fn get(url: &str, token: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn updates_pages_through_the_collection() {
    let server = spawn_test_server().await;
    for (i, at) in [100, 200, 300].into_iter().enumerate() {
        server
            .store
            .upsert_entity(
                &server.collection,
                EntityDraft::new(i as i64, RecordTypeId(1)).field("Front", "mitochondria"),
                at,
            )
            .await
            .unwrap();
    }

    let url = format!("{}/collections/{}/updates", server.base, server.collection);
    let resp = get(&format!("{}?size=2", url), "reader-token").await;
    assert_eq!(resp.status(), 200);
    let first: UpdatesPage = resp.json().await.unwrap();
    let records: Vec<EntityRecord> = codec::decode_json(&first.records).unwrap();
    assert_eq!(records.len(), 2);
    let next = first.next.unwrap();
    assert_eq!(next.revision(), 200);

    let resp = get(
        &format!("{}?size=2&since={}", url, next.to_token()),
        "reader-token",
    )
    .await;
    let second: UpdatesPage = resp.json().await.unwrap();
    let records: Vec<EntityRecord> = codec::decode_json(&second.records).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].revision, 300);
    assert!(second.next.is_none());
    assert!(second.external_records_url.is_none());
}

#[tokio::test]
async fn errors_carry_status_and_kind() {
    let server = spawn_test_server().await;
    let url = format!("{}/collections/{}/updates", server.base, server.collection);

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.kind, "unauthenticated");

    let resp = get(&format!("{}?size=0", url), "reader-token").await;
    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.kind, "validation");

    let resp = get(&format!("{}?since=not-a-cursor", url), "reader-token").await;
    assert_eq!(resp.status(), 400);

    let resp = get(
        &format!("{}/collections/{}/updates", server.base, CollectionId::new()),
        "reader-token",
    )
    .await;
    assert_eq!(resp.status(), 404);

    let resp = get(
        &format!("{}/collections/not-a-uuid/updates", server.base),
        "reader-token",
    )
    .await;
    assert_eq!(resp.status(), 404);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.kind, "not_found");
}

#[tokio::test]
async fn malformed_requests_get_validation_errors() {
    let server = spawn_test_server().await;
    let base = format!("{}/collections/{}", server.base, server.collection);

    for url in [
        format!("{}/updates?size=abc", base),
        format!("{}/media?size=1.5", base),
        format!("{}/overlays/first/assignments", server.base),
    ] {
        let resp = get(&url, "reader-token").await;
        assert_eq!(resp.status(), 400, "{}", url);
        let body: ErrorResponse = resp.json().await.unwrap();
        assert_eq!(body.kind, "validation", "{}", url);
    }

    let client = reqwest::Client::new();
    let resp = client
        .put(format!("{}/protected-tags", base))
        .bearer_auth("owner-token")
        .header("content-type", "application/json")
        .body("{\"tags\": [")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.kind, "validation");

    let resp = client
        .put(format!("{}/protected-fields/seven", base))
        .bearer_auth("owner-token")
        .json(&serde_json::json!({ "fields": ["Notes"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.kind, "validation");
}

#[tokio::test]
async fn protection_round_trip() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let base = format!("{}/collections/{}", server.base, server.collection);

    let resp = client
        .put(format!("{}/protected-fields/3", base))
        .bearer_auth("owner-token")
        .json(&serde_json::json!({ "fields": ["Notes"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .put(format!("{}/protected-tags", base))
        .bearer_auth("reader-token")
        .json(&serde_json::json!({ "tags": ["leech"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let body: serde_json::Value = get(&format!("{}/protected-fields", base), "reader-token")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!({ "fields": { "3": ["Notes"] } }));

    let page: UpdatesPage = get(&format!("{}/updates", base), "reader-token")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page.protected_fields["3"], vec!["Notes".to_string()]);
    assert!(page.protected_tags.is_empty());
}

#[tokio::test]
async fn overlays_need_more_than_read_access() {
    let server = spawn_test_server().await;
    let overlay = Overlay {
        id: OverlayId(5),
        collection_id: server.collection,
        owner_id: SubjectId::new("annotator"),
        name: "Exam Focus".into(),
        tag_group_name: "exam".into(),
    };
    server.store.upsert_overlay(&overlay).await.unwrap();

    let url = format!("{}/overlays/5/assignments", server.base);
    assert_eq!(get(&url, "reader-token").await.status(), 403);
    assert_eq!(get(&url, "subscriber-token").await.status(), 200);
    assert_eq!(
        get(&format!("{}/overlays/6/assignments", server.base), "subscriber-token")
            .await
            .status(),
        404
    );

    let listing = format!("{}/collections/{}/overlays", server.base, server.collection);
    let visible: Vec<OverlaySummary> = get(&listing, "subscriber-token")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "Exam Focus");
    let hidden: Vec<OverlaySummary> = get(&listing, "reader-token").await.json().await.unwrap();
    assert!(hidden.is_empty());
}

#[tokio::test]
async fn media_index_and_download_url() {
    let server = spawn_test_server().await;
    server
        .store
        .upsert_media(&server.collection, "cell.png", ContentHash::of(b"cell"), 100)
        .await
        .unwrap();

    let base = format!("{}/collections/{}", server.base, server.collection);
    let page: MediaPage = get(&format!("{}/media", base), "reader-token")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page.media.len(), 1);
    assert!(page.media[0].exists);
    assert_eq!(page.media[0].modified, 100);

    let resp = get(&format!("{}/media/cell.png/url", base), "reader-token").await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["url"]
        .as_str()
        .unwrap()
        .contains("deck_assets/"));

    let resp = get(&format!("{}/media/missing.png/url", base), "reader-token").await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let server = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/nonexistent", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
