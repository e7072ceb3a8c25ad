//! Job types for expiring download artifacts

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default time-to-live for a job: 15 minutes
pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// Default reaper tick: 60 seconds
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

/// Longest accepted job id
pub const MAX_JOB_ID_LEN: usize = 128;

// ============================================================================
// Artifact Types
// ============================================================================

/// What a job's artifact is, declared by its producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A single PDF document
    Document,
    /// A zip bundle of other artifacts
    Archive,
}

impl ArtifactKind {
    /// Content type served for this kind of artifact
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Document => "application/pdf",
            Self::Archive => "application/zip",
        }
    }
}

/// A completed artifact handed to the registry by a producer
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Where the artifact lives on disk
    pub path: PathBuf,

    /// Size in bytes
    pub byte_size: u64,

    /// Name offered to the client on download
    pub filename: String,

    pub kind: ArtifactKind,

    /// Extra files owned by the job and removed with it (e.g. the upload)
    pub scratch_paths: Vec<PathBuf>,
}

impl Artifact {
    /// Describe a PDF document artifact
    pub fn document(path: impl Into<PathBuf>, byte_size: u64, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            byte_size,
            filename: filename.into(),
            kind: ArtifactKind::Document,
            scratch_paths: Vec::new(),
        }
    }

    /// Describe a zip archive artifact
    pub fn archive(path: impl Into<PathBuf>, byte_size: u64, filename: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Archive,
            ..Self::document(path, byte_size, filename)
        }
    }

    /// Attach a file that should be deleted together with the job
    pub fn with_scratch(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_paths.push(path.into());
        self
    }
}

// ============================================================================
// Job Record
// ============================================================================

/// A registered job: an artifact redeemable with its token until expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,

    pub artifact_path: PathBuf,

    pub filename: String,

    pub kind: ArtifactKind,

    pub byte_size: u64,

    #[serde(default)]
    pub scratch_paths: Vec<PathBuf>,

    /// Bearer token required to redeem the artifact
    pub token: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl JobRecord {
    /// Build a record for an artifact that expires `ttl` after `now`
    ///
    /// Fails with `InvalidTtl` for a negative `ttl` or one whose expiry
    /// falls outside the representable time range.
    pub fn new(
        job_id: impl Into<String>,
        artifact: Artifact,
        token: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, JobError> {
        if ttl < Duration::zero() {
            return Err(JobError::InvalidTtl(format!("negative ttl: {}", ttl)));
        }

        // Records persist at millisecond precision
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| JobError::InvalidTtl(format!("ttl out of range: {}", ttl)))?;

        Ok(Self {
            job_id: job_id.into(),
            artifact_path: artifact.path,
            filename: artifact.filename,
            kind: artifact.kind,
            byte_size: artifact.byte_size,
            scratch_paths: artifact.scratch_paths,
            token,
            created_at: now,
            expires_at,
        })
    }

    /// A job stays redeemable up to and including its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Every file this job owns on disk, artifact first
    pub fn owned_paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.artifact_path.as_path())
            .chain(self.scratch_paths.iter().map(PathBuf::as_path))
    }
}

/// Relative download URL for a job id and token
pub fn download_url(job_id: &str, token: &str) -> String {
    format!("/v1/jobs/{}/download?token={}", job_id, token)
}

/// Token and expiry handed back when a job is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedJob {
    pub job_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedJob {
    pub fn download_url(&self) -> String {
        download_url(&self.job_id, &self.token)
    }
}

/// Reference to a job presented by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    pub token: String,
}

/// Job ids reach the filesystem, so only a conservative alphabet is accepted
pub fn is_valid_job_id(job_id: &str) -> bool {
    !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Generate a job id for a producer, e.g. `zip_4f0c...`
pub fn new_job_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Error Types
// ============================================================================

/// Job lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Wrong or expired token
    #[error("Forbidden")]
    Forbidden,

    #[error("No valid files")]
    EmptyBundle,

    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Job store error: {0}")]
    Storage(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid job ttl: {0}")]
    InvalidTtl(String),
}

impl JobError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::EmptyBundle => StatusCode::NOT_FOUND,
            Self::DuplicateJob(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidTtl(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden => "forbidden",
            Self::EmptyBundle => "not_found",
            Self::DuplicateJob(_) => "duplicate_job",
            Self::Storage(_) => "internal_error",
            Self::Archive(_) => "internal_error",
            Self::InvalidTtl(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ttl: Duration) -> JobRecord {
        JobRecord::new(
            "cpdf_1",
            Artifact::document("/tmp/a.pdf", 100, "a.pdf").with_scratch("/tmp/upload.pdf"),
            "tok".to_string(),
            Utc::now(),
            ttl,
        )
        .unwrap()
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let record = record(Duration::minutes(1));
        assert!(!record.is_expired_at(record.expires_at));
        assert!(record.is_expired_at(record.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_zero_ttl_expires_at_creation() {
        let record = record(Duration::zero());
        assert_eq!(record.expires_at, record.created_at);
        assert!(!record.is_expired_at(record.created_at));
    }

    #[test]
    fn test_unrepresentable_ttl_is_rejected() {
        let build = |ttl| {
            JobRecord::new(
                "cpdf_1",
                Artifact::document("/tmp/a.pdf", 100, "a.pdf"),
                "tok".to_string(),
                Utc::now(),
                ttl,
            )
        };

        assert!(matches!(build(Duration::MAX), Err(JobError::InvalidTtl(_))));
        assert!(matches!(build(Duration::minutes(-1)), Err(JobError::InvalidTtl(_))));
        assert!(matches!(build(Duration::days(365 * 270_000)), Err(JobError::InvalidTtl(_))));
    }

    #[test]
    fn test_owned_paths_lists_artifact_first() {
        let record = record(Duration::minutes(1));
        let paths: Vec<_> = record.owned_paths().collect();
        assert_eq!(paths, vec![Path::new("/tmp/a.pdf"), Path::new("/tmp/upload.pdf")]);
    }

    #[test]
    fn test_record_persists_expiry_as_millis() {
        let record = record(Duration::minutes(1));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["expiresAt"].as_i64(), Some(record.expires_at.timestamp_millis()));

        let back: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.token, record.token);
        assert_eq!(back.expires_at.timestamp_millis(), record.expires_at.timestamp_millis());
    }

    #[test]
    fn test_job_id_validation() {
        assert!(is_valid_job_id("zip_4f0c9a"));
        assert!(is_valid_job_id(&new_job_id("cpdf")));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("../etc/passwd"));
        assert!(!is_valid_job_id("a/b"));
        assert!(!is_valid_job_id(&"x".repeat(MAX_JOB_ID_LEN + 1)));
    }

    #[test]
    fn test_content_type_follows_kind() {
        assert_eq!(ArtifactKind::Document.content_type(), "application/pdf");
        assert_eq!(ArtifactKind::Archive.content_type(), "application/zip");
    }
}
