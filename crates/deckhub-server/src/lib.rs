//! HTTP API of the Deckhub sync service.
//!
//! Thin axum handlers over [`SyncService`]: they pull the bearer credential
//! and the path and query parameters, call one service operation, and map
//! its error kind to a status code.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use deckhub::core::{CollectionId, OverlayId, RecordTypeId};
use deckhub::store::Store;
use deckhub::{
    AssignmentsPage, MediaPage, PageQuery, ProtectedFields, ProtectedTags, ServiceError,
    SignedUrl, SyncService, UpdatesPage, UpdatesQuery,
};

/// Shared handler state.
pub type AppState = Arc<SyncService<dyn Store>>;

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error kind, e.g. `unauthorized`.
    pub kind: String,
}

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "validation",
            message: message.into(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let status =
            StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(kind = kind.as_str(), error = %err, "request failed");
        }
        Self {
            status,
            kind: kind.as_str(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                kind: self.kind.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn bearer(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("")
}

/// A path segment that is not a collection id names no collection.
fn collection_id(raw: &str) -> Result<CollectionId, ApiError> {
    raw.parse()
        .map_err(|_| ServiceError::NotFound(format!("collection {}", raw)).into())
}

type PathParam<T> = Result<Path<T>, PathRejection>;
type QueryParam<T> = Result<Query<T>, QueryRejection>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn updates(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
    query: QueryParam<UpdatesQuery>,
) -> ApiResult<UpdatesPage> {
    let Path(id) = path?;
    let Query(query) = query?;
    let collection = collection_id(&id)?;
    let page = service
        .collection_updates(bearer(&headers), &collection, &query)
        .await?;
    Ok(Json(page))
}

async fn media(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
    query: QueryParam<PageQuery>,
) -> ApiResult<MediaPage> {
    let Path(id) = path?;
    let Query(query) = query?;
    let collection = collection_id(&id)?;
    let page = service
        .media_updates(bearer(&headers), &collection, &query)
        .await?;
    Ok(Json(page))
}

async fn media_url(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<(String, String)>,
) -> ApiResult<SignedUrl> {
    let Path((id, name)) = path?;
    let collection = collection_id(&id)?;
    let url = service
        .media_download_url(bearer(&headers), &collection, &name)
        .await?;
    Ok(Json(url))
}

async fn assignments(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<u64>,
    query: QueryParam<PageQuery>,
) -> ApiResult<AssignmentsPage> {
    let Path(id) = path?;
    let Query(query) = query?;
    let page = service
        .overlay_assignments(bearer(&headers), &OverlayId(id), &query)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverlaySummary {
    pub id: u64,
    pub name: String,
    pub tag_group_name: String,
}

async fn overlays(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
) -> ApiResult<Vec<OverlaySummary>> {
    let Path(id) = path?;
    let collection = collection_id(&id)?;
    let overlays = service
        .list_overlays(bearer(&headers), &collection)
        .await?
        .into_iter()
        .map(|o| OverlaySummary {
            id: o.id.0,
            name: o.name,
            tag_group_name: o.tag_group_name,
        })
        .collect();
    Ok(Json(overlays))
}

async fn protected_fields(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
) -> ApiResult<ProtectedFields> {
    let Path(id) = path?;
    let collection = collection_id(&id)?;
    Ok(Json(
        service
            .protected_fields(bearer(&headers), &collection)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct FieldNames {
    fields: Vec<String>,
}

async fn put_protected_fields(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<(String, i64)>,
    body: JsonBody<FieldNames>,
) -> ApiResult<ProtectedFields> {
    let Path((id, type_id)) = path?;
    let Json(body) = body?;
    let collection = collection_id(&id)?;
    Ok(Json(
        service
            .set_protected_fields(
                bearer(&headers),
                &collection,
                RecordTypeId(type_id),
                body.fields,
            )
            .await?,
    ))
}

async fn protected_tags(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
) -> ApiResult<ProtectedTags> {
    let Path(id) = path?;
    let collection = collection_id(&id)?;
    Ok(Json(
        service.protected_tags(bearer(&headers), &collection).await?,
    ))
}

async fn put_protected_tags(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
    body: JsonBody<ProtectedTags>,
) -> ApiResult<ProtectedTags> {
    let Path(id) = path?;
    let Json(body) = body?;
    let collection = collection_id(&id)?;
    Ok(Json(
        service
            .set_protected_tags(bearer(&headers), &collection, body.tags)
            .await?,
    ))
}

/// A published bulk export.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    pub storage_key: String,
    /// Revision the export covers up to.
    pub revision: i64,
    pub record_count: u64,
}

async fn publish_export(
    State(service): State<AppState>,
    headers: HeaderMap,
    path: PathParam<String>,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    let collection = collection_id(&id)?;
    match service.publish_export(bearer(&headers), &collection).await? {
        Some(snapshot) => Ok(Json(ExportResponse {
            storage_key: snapshot.storage_key,
            revision: snapshot.position.revision,
            record_count: snapshot.record_count,
        })
        .into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// Build the HTTP API router over a sync service.
pub fn build_router(service: AppState) -> Router {
    Router::new()
        .route("/collections/{id}/updates", get(updates))
        .route("/collections/{id}/media", get(media))
        .route("/collections/{id}/media/{name}/url", get(media_url))
        .route("/collections/{id}/overlays", get(overlays))
        .route(
            "/collections/{id}/protected-fields",
            get(protected_fields),
        )
        .route(
            "/collections/{id}/protected-fields/{type_id}",
            put(put_protected_fields),
        )
        .route(
            "/collections/{id}/protected-tags",
            get(protected_tags).put(put_protected_tags),
        )
        .route("/collections/{id}/exports", post(publish_export))
        .route("/overlays/{id}/assignments", get(assignments))
        .with_state(service)
}
