//! HTTP request handlers for the docrank API
//!
//! Thin glue over the registry: parse the request, call the matching
//! registry operation, wrap the outcome in the response envelope.
//! Listing and ranking reads never fail; absence of data is an empty
//! array.

use crate::core::AppState;
use crate::system::metrics;
use crate::types::{DocumentRecord, Error};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Instant;

static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Uniform response envelope
#[derive(Serialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Payload, when there is one
    pub data: Option<T>,
    /// Human-readable note
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    fn with_message(data: T, message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
        })
    }
}

fn message_only(message: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        data: None,
        message: Some(message.to_string()),
    })
}

/// Error wrapper translating registry failures into HTTP responses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(self.0.to_string()),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// Request/response bodies

/// Body of the text-create endpoint
#[derive(Deserialize)]
pub struct CreateRequest {
    /// Display name; must not be empty
    pub name: String,
    /// Initial text content, may be empty
    #[serde(default)]
    pub content: String,
}

/// Body of the rename endpoint
#[derive(Deserialize)]
pub struct RenameRequest {
    /// Replacement display name
    pub new_name: String,
}

/// Body of the content-edit endpoint
#[derive(Deserialize)]
pub struct UpdateContentRequest {
    /// Replacement text content
    #[serde(default)]
    pub content: String,
}

/// Body of the batched click endpoint
#[derive(Deserialize)]
pub struct BulkClickRequest {
    /// Target document
    pub file_id: String,
    /// Number of increments to apply, 1..=1000
    pub count: u64,
}

/// Outcome of a batched click request
#[derive(Serialize)]
pub struct BulkClickResponse {
    /// Target document
    pub file_id: String,
    /// Click counter after the batch
    pub clicks: u64,
    /// Increments applied by this request
    pub added: u64,
}

/// Payload of the health endpoint
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always "ok" when the process answers
    pub status: String,
    /// Seconds since startup
    pub uptime_secs: u64,
    /// Crate version
    pub version: String,
}

/// Payload of the content-read endpoint
#[derive(Serialize)]
pub struct ContentResponse {
    /// Text content, truncated for very large documents
    pub content: String,
}

// Handlers

/// GET /api/health
pub async fn health_check() -> Json<ApiResponse<HealthResponse>> {
    ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: SERVER_START.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
    })
}

/// GET /api/ranking
pub async fn get_ranking(State(state): State<AppState>) -> Json<ApiResponse<Vec<DocumentRecord>>> {
    ApiResponse::ok(state.registry.ranking())
}

/// GET /api/files
pub async fn list_documents(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<DocumentRecord>>> {
    ApiResponse::ok(state.registry.list())
}

/// GET /api/files/:id
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DocumentRecord> {
    Ok(ApiResponse::ok(state.registry.get(&id)?))
}

/// POST /api/files/create
pub async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DocumentRecord>>), ApiError> {
    let record = state.registry.create(&req.name, &req.content).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(record, "document created"),
    ))
}

/// POST /api/files/upload, multipart with a `file` field
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<DocumentRecord>>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("invalid multipart request: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| Error::validation("upload is missing a filename"))?;
        let data: bytes::Bytes = field
            .bytes()
            .await
            .map_err(|e| Error::validation(format!("failed to read upload: {e}")))?;
        if data.len() > state.config.server.max_upload_bytes {
            return Err(Error::validation(format!(
                "upload exceeds the {} byte limit",
                state.config.server.max_upload_bytes
            ))
            .into());
        }

        let record = state.registry.create_from_bytes(&name, &data).await?;
        return Ok((
            StatusCode::CREATED,
            ApiResponse::with_message(record, "document uploaded"),
        ));
    }
    Err(Error::validation("multipart request has no `file` field").into())
}

/// POST /api/files/:id/click
pub async fn click_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DocumentRecord> {
    Ok(ApiResponse::ok(state.registry.click(&id)?))
}

/// POST /api/files/click: batched clicks, applied as individual
/// increments. Stops at the first unknown id; prior increments in the
/// batch remain applied.
pub async fn bulk_click(
    State(state): State<AppState>,
    Json(req): Json<BulkClickRequest>,
) -> ApiResult<BulkClickResponse> {
    if req.count == 0 || req.count > 1000 {
        return Err(Error::validation("count must be between 1 and 1000").into());
    }

    let mut record = state.registry.click(&req.file_id)?;
    for _ in 1..req.count {
        record = state.registry.click(&req.file_id)?;
    }

    Ok(ApiResponse::ok(BulkClickResponse {
        file_id: record.id,
        clicks: record.clicks,
        added: req.count,
    }))
}

/// PUT /api/files/:id/rename
pub async fn rename_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<DocumentRecord> {
    Ok(ApiResponse::ok(state.registry.rename(&id, &req.new_name)?))
}

/// GET /api/files/:id/content
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ContentResponse> {
    let content = state.registry.read_content(&id).await?;
    Ok(ApiResponse::ok(ContentResponse { content }))
}

/// PUT /api/files/:id/content/edit
pub async fn update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateContentRequest>,
) -> ApiResult<DocumentRecord> {
    let record = state.registry.replace_content(&id, &req.content).await?;
    Ok(ApiResponse::ok(record))
}

/// GET /api/files/:id/download
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (record, data) = state.registry.read_raw(&id).await?;
    let filename = crate::storage::blobs::sanitize_filename(&record.name);

    let headers = [
        (
            header::CONTENT_TYPE,
            "application/octet-stream".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, data).into_response())
}

/// DELETE /api/files/:id
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.registry.delete(&id).await?;
    Ok(message_only("document deleted"))
}

/// GET /api/metrics
pub async fn metrics_endpoint() -> Result<String, ApiError> {
    Ok(metrics::render()?)
}
