//! Error types for the PDF Tools server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::jobs::JobError;
use crate::stats::StatsError;
use crate::tools::ProcessingError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(rename = "maxBytes", skip_serializing_if = "Option::is_none")]
    max_bytes: Option<u64>,
    #[serde(rename = "maxMB", skip_serializing_if = "Option::is_none")]
    max_mb: Option<u64>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Unexpected server error.".to_string(),
                )
            }
            AppError::Job(e) => {
                if e.status_code().is_server_error() {
                    tracing::error!("Job error: {}", e);
                    return (e.status_code(), e.code(), "Unexpected server error.".to_string());
                }
                (e.status_code(), e.code(), e.to_string())
            }
            AppError::Processing(e) => {
                if e.status_code().is_server_error() {
                    tracing::error!("Processing error: {}", e);
                } else {
                    tracing::warn!("Processing rejected: {}", e);
                }
                (e.status_code(), e.code(), e.to_string())
            }
            AppError::Stats(e) => {
                let code = match e {
                    StatsError::InvalidRating(_) => "invalid_rating",
                    _ => {
                        tracing::error!("Stats error: {}", e);
                        "stats_failed"
                    }
                };
                (e.status_code(), code, e.to_string())
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Unexpected server error.".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let (max_bytes, max_mb) = match &self {
            AppError::Processing(ProcessingError::FileTooLarge { max_bytes }) => {
                (Some(*max_bytes), Some(*max_bytes / (1024 * 1024)))
            }
            _ => (None, None),
        };

        let body = Json(ErrorResponse {
            error: ErrorBody {
                code,
                message,
                max_bytes,
                max_mb,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_errors_map_to_statuses() {
        let not_found = AppError::from(JobError::NotFound("x".into())).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let forbidden = AppError::from(JobError::Forbidden).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let empty = AppError::from(JobError::EmptyBundle).into_response();
        assert_eq!(empty.status(), StatusCode::NOT_FOUND);

        let dup = AppError::from(JobError::DuplicateJob("x".into())).into_response();
        assert_eq!(dup.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_processing_errors_map_to_statuses() {
        let too_large = AppError::from(ProcessingError::FileTooLarge { max_bytes: 1 }).into_response();
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_type = AppError::from(ProcessingError::InvalidFileType("x".into())).into_response();
        assert_eq!(wrong_type.status(), StatusCode::BAD_REQUEST);

        let few = AppError::from(ProcessingError::TooFewInputs(2)).into_response();
        assert_eq!(few.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
