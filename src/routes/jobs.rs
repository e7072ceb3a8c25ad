//! Job Routes
//!
//! Endpoints:
//! - GET /v1/jobs/:job_id/download?token=... - Stream a job's artifact
//! - POST /v1/jobs/zip - Bundle several jobs into one zip job

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, Result};
use crate::jobs::{Download, JobError, JobTicket};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct BundleRequest {
    #[serde(default)]
    pub items: Vec<JobTicket>,
}

#[derive(Debug, Serialize)]
pub struct BundleResponse {
    pub job_id: String,
    pub status: &'static str,
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
    pub count: usize,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/zip", post(create_bundle))
        .route("/:job_id/download", get(download))
}

// ============================================================================
// Handlers
// ============================================================================

/// Stream an artifact to a holder of its token
///
/// Unknown jobs answer 404 and bad or expired tokens 403, both without a body.
async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    match state.registry().resolve(&job_id, &query.token).await {
        Ok(download) => {
            tracing::debug!(job_id = %job_id, bytes = download.byte_size, "Serving download");
            stream_download(download)
        }
        Err(JobError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(JobError::Forbidden) => StatusCode::FORBIDDEN.into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

fn stream_download(download: Download) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    let body = Body::from_stream(ReaderStream::new(download.file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.content_type)
        .header(header::CONTENT_LENGTH, download.byte_size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CACHE_CONTROL, "no-store")
        .body(body)
        .unwrap_or_else(|e| AppError::Internal(e.to_string()).into_response())
}

/// Bundle the valid jobs among `items` into a new zip job
async fn create_bundle(
    State(state): State<AppState>,
    Json(request): Json<BundleRequest>,
) -> Result<Json<BundleResponse>> {
    if request.items.is_empty() {
        return Err(AppError::BadRequest("items must be a non-empty array".to_string()));
    }

    let bundle = state.bundles().build(&request.items).await?;

    Ok(Json(BundleResponse {
        download_url: bundle.download_url(),
        job_id: bundle.job_id,
        status: "completed",
        expires_at: bundle.expires_at,
        count: bundle.count,
    }))
}
