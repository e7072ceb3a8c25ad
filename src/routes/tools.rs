//! PDF Tool Routes
//!
//! Producers whose output is handed back as a download job.
//!
//! Endpoints:
//! - POST /v1/pdf/compress - Multipart `file` plus options, Ghostscript re-encode
//! - POST /v1/pdf/merge - Multipart `files[]`, concatenated in upload order

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::config::ToolsConfig;
use crate::error::{AppError, Result};
use crate::jobs::{new_job_id, Artifact};
use crate::state::AppState;
use crate::stats::counters::{COMPRESS_PDF, MERGE_PDF};
use crate::tools::compress::compression_ratio;
use crate::tools::merge::{MAX_MERGE_INPUTS, MIN_MERGE_INPUTS};
use crate::tools::{is_pdf_upload, merge_pdfs, sanitize_file_name, CompressOptions, ProcessingError};

/// Job id prefix for compressions
pub const COMPRESS_PREFIX: &str = "cpdf";

/// Job id prefix for merges
pub const MERGE_PREFIX: &str = "mpdf";

/// Slack above the file limit for multipart framing and text fields
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct InputInfo {
    pub filename: String,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct CompressedOutput {
    pub filename: String,
    pub bytes: u64,
    pub compression_ratio: f64,
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CompressOptionsEcho {
    pub compression: String,
    pub downsample_dpi: u32,
    pub remove_metadata: bool,
}

#[derive(Debug, Serialize)]
pub struct CompressResponse {
    pub job_id: String,
    pub status: &'static str,
    pub input: InputInfo,
    pub output: CompressedOutput,
    pub options: CompressOptionsEcho,
}

#[derive(Debug, Serialize)]
pub struct MergedOutput {
    pub filename: String,
    pub bytes: u64,
    pub pages: usize,
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub job_id: String,
    pub status: &'static str,
    pub output: MergedOutput,
    pub count: usize,
}

// ============================================================================
// Router
// ============================================================================

/// Compress requests carry one file; merge requests carry several, each
/// still held to the single-file limit by the handler
pub fn router(tools: &ToolsConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/compress",
            post(compress).layer(DefaultBodyLimit::max(body_limit(tools.max_upload_bytes()))),
        )
        .route(
            "/merge",
            post(merge).layer(DefaultBodyLimit::max(body_limit(tools.max_merge_bytes()))),
        )
}

fn body_limit(max_bytes: u64) -> usize {
    usize::try_from(max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES)
}

// ============================================================================
// Compress
// ============================================================================

/// An uploaded file spooled to disk
struct SavedUpload {
    path: PathBuf,
    filename: String,
    bytes: u64,
}

async fn compress(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<CompressResponse>> {
    let config = state.config();
    let mut upload: Option<SavedUpload> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    let read = read_compress_form(
        &mut multipart,
        &config.paths.upload_dir,
        config.tools.max_upload_bytes(),
        &mut upload,
        &mut fields,
    )
    .await;
    if let Err(e) = read {
        if let Some(saved) = &upload {
            remove_quietly(&saved.path).await;
        }
        return Err(e);
    }
    let upload = upload.ok_or(ProcessingError::MissingFile)?;

    let compression = fields
        .get("compression")
        .cloned()
        .unwrap_or_else(|| "medium".to_string());
    let options = CompressOptions::from_form(
        Some(compression.as_str()),
        fields.get("downsample_dpi").map(String::as_str),
        fields.get("remove_metadata").map(String::as_str),
    );

    let job_id = new_job_id(COMPRESS_PREFIX);
    let output_name = format!("{}-compressed.pdf", pdf_stem(&upload.filename));
    let output_path = config.paths.tmp_dir.join(format!("{}-{}", job_id, output_name));

    tracing::info!(
        job_id = %job_id,
        filename = %upload.filename,
        bytes = upload.bytes,
        quality = options.quality.preset(),
        dpi = options.dpi,
        "Compression started"
    );

    let output_bytes = match state
        .ghostscript()
        .compress(&upload.path, &output_path, &options)
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            remove_quietly(&upload.path).await;
            remove_quietly(&output_path).await;
            return Err(e.into());
        }
    };

    state.counters().bump_quietly(COMPRESS_PDF).await;

    let artifact =
        Artifact::document(&output_path, output_bytes, &output_name).with_scratch(&upload.path);
    let issued = match state.registry().register(&job_id, artifact).await {
        Ok(issued) => issued,
        Err(e) => {
            remove_quietly(&upload.path).await;
            remove_quietly(&output_path).await;
            return Err(e.into());
        }
    };

    tracing::info!(job_id = %job_id, output_bytes = output_bytes, "Compression completed");

    Ok(Json(CompressResponse {
        job_id: issued.job_id.clone(),
        status: "completed",
        input: InputInfo {
            filename: upload.filename,
            bytes: upload.bytes,
        },
        output: CompressedOutput {
            filename: output_name,
            bytes: output_bytes,
            compression_ratio: compression_ratio(upload.bytes, output_bytes),
            download_url: issued.download_url(),
            expires_at: issued.expires_at,
        },
        options: CompressOptionsEcho {
            compression,
            downsample_dpi: options.dpi,
            remove_metadata: options.remove_metadata,
        },
    }))
}

/// Read the compress form, spooling `file` to the upload directory
///
/// `upload` is filled as soon as a file lands on disk, so the caller can
/// discard it if a later field fails.
async fn read_compress_form(
    multipart: &mut Multipart,
    upload_dir: &Path,
    max_bytes: u64,
    upload: &mut Option<SavedUpload>,
    fields: &mut HashMap<String, String>,
) -> Result<()> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name != "file" {
            let value = field.text().await.map_err(|e| upload_error(e, max_bytes))?;
            fields.insert(name, value);
            continue;
        }
        if upload.is_some() {
            return Err(AppError::BadRequest("only one file may be uploaded".to_string()));
        }

        let filename = sanitize_file_name(field.file_name().unwrap_or("file.pdf"));
        if !is_pdf_upload(field.content_type(), &filename) {
            return Err(ProcessingError::InvalidFileType(filename).into());
        }

        let path = upload_dir.join(format!("{}-{}", uuid::Uuid::new_v4().simple(), filename));
        let mut file = tokio::fs::File::create(&path).await?;
        *upload = Some(SavedUpload {
            path: path.clone(),
            filename,
            bytes: 0,
        });

        let mut written: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(|e| upload_error(e, max_bytes))? {
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(ProcessingError::FileTooLarge { max_bytes }.into());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if let Some(saved) = upload.as_mut() {
            saved.bytes = written;
        }
    }

    Ok(())
}

// ============================================================================
// Merge
// ============================================================================

async fn merge(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<MergeResponse>> {
    let max_bytes = state.config().tools.max_upload_bytes();
    let max_request = state.config().tools.max_merge_bytes();
    let mut inputs: Vec<Vec<u8>> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, max_request))?
    {
        if !matches!(field.name(), Some("files[]") | Some("files")) {
            continue;
        }
        if inputs.len() == MAX_MERGE_INPUTS {
            return Err(ProcessingError::TooManyInputs(MAX_MERGE_INPUTS).into());
        }

        let filename = field.file_name().unwrap_or("").to_string();
        if !is_pdf_upload(field.content_type(), &filename) {
            return Err(ProcessingError::UnsupportedMediaType(filename).into());
        }

        let data = field.bytes().await.map_err(|e| upload_error(e, max_request))?;
        if data.len() as u64 > max_bytes {
            return Err(ProcessingError::FileTooLarge { max_bytes }.into());
        }
        inputs.push(data.to_vec());
    }

    if inputs.len() < MIN_MERGE_INPUTS {
        return Err(ProcessingError::TooFewInputs(MIN_MERGE_INPUTS).into());
    }

    let count = inputs.len();
    let merged = tokio::task::spawn_blocking(move || merge_pdfs(&inputs))
        .await
        .map_err(|e| AppError::Internal(format!("merge task failed: {}", e)))??;

    let job_id = new_job_id(MERGE_PREFIX);
    let filename = format!("merged-{}.pdf", uuid::Uuid::new_v4().simple());
    let path = state.config().paths.tmp_dir.join(&filename);
    tokio::fs::write(&path, &merged.bytes).await?;
    let bytes = merged.bytes.len() as u64;

    let issued = match state
        .registry()
        .register(&job_id, Artifact::document(&path, bytes, &filename))
        .await
    {
        Ok(issued) => issued,
        Err(e) => {
            remove_quietly(&path).await;
            return Err(e.into());
        }
    };

    state.counters().bump_quietly(MERGE_PDF).await;

    tracing::info!(job_id = %job_id, inputs = count, pages = merged.pages, bytes = bytes, "Merge completed");

    Ok(Json(MergeResponse {
        job_id: issued.job_id.clone(),
        status: "completed",
        output: MergedOutput {
            filename,
            bytes,
            pages: merged.pages,
            download_url: issued.download_url(),
            expires_at: issued.expires_at,
        },
        count,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Map a multipart failure, reporting `max_bytes` when the body limit tripped
fn upload_error(e: MultipartError, max_bytes: u64) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ProcessingError::FileTooLarge { max_bytes }.into();
    }
    ProcessingError::Upload(e.to_string()).into()
}

/// Strip a trailing `.pdf`, whatever its case
fn pdf_stem(filename: &str) -> &str {
    let split = filename.len().saturating_sub(4);
    match filename.get(split..) {
        Some(ext) if ext.eq_ignore_ascii_case(".pdf") => &filename[..split],
        _ => filename,
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
