//! Job Registry
//!
//! Tracks produced artifacts as jobs that can be redeemed with a bearer
//! token until they expire:
//! - Registration issues a fresh token and an absolute expiry
//! - Resolution validates existence, token and expiry, then opens the artifact
//! - Removal deletes the record and, best effort, the files it owns

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::fs::File;

use super::store::JobStore;
use super::token;
use super::types::{Artifact, IssuedJob, JobError, JobRecord, DEFAULT_TTL_MINUTES};

// ============================================================================
// Download Descriptor
// ============================================================================

/// An artifact opened for streaming to a client
#[derive(Debug)]
pub struct Download {
    pub file: File,
    pub content_type: &'static str,
    pub filename: String,
    pub byte_size: u64,
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of live jobs
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<JobRegistryInner>,
}

struct JobRegistryInner {
    store: Arc<dyn JobStore>,

    /// Time-to-live applied by `register`
    ttl: Duration,
}

impl JobRegistry {
    /// Create a registry over a store with the default TTL
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self::with_ttl(store, Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    /// Create a registry with a custom TTL
    pub fn with_ttl(store: Arc<dyn JobStore>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(JobRegistryInner { store, ttl }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub(crate) fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register a completed artifact under `job_id` with the default TTL
    pub async fn register(&self, job_id: &str, artifact: Artifact) -> Result<IssuedJob, JobError> {
        self.register_with_ttl(job_id, artifact, self.inner.ttl).await
    }

    /// Register a completed artifact under `job_id`, expiring after `ttl`
    ///
    /// Fails with `DuplicateJob` if the id is already registered; an existing
    /// record is never overwritten. A negative or unrepresentable `ttl` fails
    /// with `InvalidTtl` before anything is stored.
    pub async fn register_with_ttl(
        &self,
        job_id: &str,
        artifact: Artifact,
        ttl: Duration,
    ) -> Result<IssuedJob, JobError> {
        let record = JobRecord::new(job_id, artifact, token::issue(), Utc::now(), ttl)?;
        self.inner.store.insert_new(&record).await?;

        tracing::info!(
            job_id = %record.job_id,
            filename = %record.filename,
            kind = ?record.kind,
            bytes = record.byte_size,
            expires_at = %record.expires_at,
            "Registered job"
        );

        Ok(IssuedJob {
            job_id: record.job_id,
            token: record.token,
            expires_at: record.expires_at,
        })
    }

    /// Look up a job by id
    pub async fn lookup(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.inner
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Remove a job and, best effort, the files it owns
    ///
    /// Never fails: file or record deletion problems are logged. Returns
    /// whether a record was removed.
    pub async fn remove(&self, job_id: &str) -> bool {
        let record = match self.inner.store.get(job_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Could not read job before removal");
                None
            }
        };

        if let Some(record) = &record {
            discard_files(record).await;
        }

        match self.inner.store.delete(job_id).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to delete job record");
                false
            }
        }
    }

    // ========================================================================
    // Redemption
    // ========================================================================

    /// Check a presented token at `now`
    ///
    /// Order: the job must exist (`NotFound`), the token must match exactly
    /// and the job must not have expired (both `Forbidden`).
    pub async fn validate_at(
        &self,
        job_id: &str,
        presented_token: &str,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, JobError> {
        let record = self.lookup(job_id).await?;

        if !token::tokens_match(presented_token, &record.token) {
            return Err(JobError::Forbidden);
        }

        if record.is_expired_at(now) {
            return Err(JobError::Forbidden);
        }

        Ok(record)
    }

    pub async fn validate(&self, job_id: &str, presented_token: &str) -> Result<JobRecord, JobError> {
        self.validate_at(job_id, presented_token, Utc::now()).await
    }

    /// Validate a token and open the job's artifact for streaming
    ///
    /// Tokens are reusable until expiry; resolving does not consume them.
    pub async fn resolve(&self, job_id: &str, presented_token: &str) -> Result<Download, JobError> {
        let record = self.validate(job_id, presented_token).await?;

        // The reaper may have won the race for the file
        let file = File::open(&record.artifact_path)
            .await
            .map_err(|_| JobError::NotFound(job_id.to_string()))?;

        let byte_size = file
            .metadata()
            .await
            .map(|m| m.len())
            .unwrap_or(record.byte_size);

        tracing::debug!(job_id = %job_id, filename = %record.filename, "Resolved download");

        Ok(Download {
            file,
            content_type: record.kind.content_type(),
            filename: record.filename,
            byte_size,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Delete every file a job owns, logging failures
///
/// Returns the number of files that could not be deleted. A file that is
/// already gone is not a failure.
pub(crate) async fn discard_files(record: &JobRecord) -> usize {
    let mut failures = 0;
    for path in record.owned_paths() {
        if !remove_if_present(path).await {
            failures += 1;
        }
    }
    failures
}

async fn remove_if_present(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete job file");
            false
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::{DirectoryJobStore, MemoryJobStore};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn registry_in(temp_dir: &TempDir) -> JobRegistry {
        let store = DirectoryJobStore::open(temp_dir.path().join("index"))
            .await
            .unwrap();
        JobRegistry::new(Arc::new(store))
    }

    fn write_artifact(temp_dir: &TempDir, name: &str, len: usize) -> Artifact {
        let path = temp_dir.path().join(name);
        std::fs::write(&path, vec![b'x'; len]).unwrap();
        Artifact::document(path, len as u64, name)
    }

    #[tokio::test]
    async fn test_lookup_after_register() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_in(&temp_dir).await;

        let issued = registry
            .register("cpdf_1", write_artifact(&temp_dir, "a.pdf", 100))
            .await
            .unwrap();

        let record = registry.lookup("cpdf_1").await.unwrap();
        assert_eq!(record.token, issued.token);
        assert_eq!(record.expires_at, issued.expires_at);
        assert!(record.expires_at > Utc::now());
        assert_eq!(issued.download_url(), format!("/v1/jobs/cpdf_1/download?token={}", issued.token));
    }

    #[tokio::test]
    async fn test_register_duplicate_id_fails() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_in(&temp_dir).await;

        let first = registry
            .register("cpdf_1", write_artifact(&temp_dir, "a.pdf", 10))
            .await
            .unwrap();
        let second = registry
            .register("cpdf_1", write_artifact(&temp_dir, "b.pdf", 10))
            .await;

        assert!(matches!(second, Err(JobError::DuplicateJob(_))));
        assert_eq!(registry.lookup("cpdf_1").await.unwrap().token, first.token);
    }

    #[tokio::test]
    async fn test_register_with_unrepresentable_ttl_fails() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_in(&temp_dir).await;

        let result = registry
            .register_with_ttl("cpdf_1", write_artifact(&temp_dir, "a.pdf", 10), Duration::MAX)
            .await;
        assert!(matches!(result, Err(JobError::InvalidTtl(_))));

        let result = registry
            .register_with_ttl("cpdf_1", write_artifact(&temp_dir, "a.pdf", 10), Duration::seconds(-1))
            .await;
        assert!(matches!(result, Err(JobError::InvalidTtl(_))));

        assert!(matches!(registry.lookup("cpdf_1").await, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_is_repeatable() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_in(&temp_dir).await;
        let issued = registry
            .register("cpdf_1", write_artifact(&temp_dir, "a.pdf", 100))
            .await
            .unwrap();

        for _ in 0..2 {
            let mut download = registry.resolve("cpdf_1", &issued.token).await.unwrap();
            assert_eq!(download.content_type, "application/pdf");
            assert_eq!(download.filename, "a.pdf");
            assert_eq!(download.byte_size, 100);

            let mut body = Vec::new();
            download.file.read_to_end(&mut body).await.unwrap();
            assert_eq!(body.len(), 100);
        }
    }

    #[tokio::test]
    async fn test_wrong_and_expired_tokens_are_both_forbidden() {
        let registry = JobRegistry::new(Arc::new(MemoryJobStore::new()));
        let issued = registry
            .register("cpdf_1", Artifact::document("/nonexistent/a.pdf", 1, "a.pdf"))
            .await
            .unwrap();

        let wrong = registry.validate("cpdf_1", "not-the-token").await;
        assert!(matches!(wrong, Err(JobError::Forbidden)));

        let prefix = registry.validate("cpdf_1", &issued.token[..8]).await;
        assert!(matches!(prefix, Err(JobError::Forbidden)));

        let later = issued.expires_at + Duration::milliseconds(1);
        let expired = registry.validate_at("cpdf_1", &issued.token, later).await;
        assert!(matches!(expired, Err(JobError::Forbidden)));

        let at_expiry = registry.validate_at("cpdf_1", &issued.token, issued.expires_at).await;
        assert!(at_expiry.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let registry = JobRegistry::new(Arc::new(MemoryJobStore::new()));
        let result = registry.resolve("missing", "whatever").await;
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_with_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_in(&temp_dir).await;
        let artifact = write_artifact(&temp_dir, "a.pdf", 10);
        let path = artifact.path.clone();
        let issued = registry.register("cpdf_1", artifact).await.unwrap();

        std::fs::remove_file(path).unwrap();

        let result = registry.resolve("cpdf_1", &issued.token).await;
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_deletes_record_and_files() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_in(&temp_dir).await;

        let upload = temp_dir.path().join("upload.pdf");
        std::fs::write(&upload, b"input").unwrap();
        let artifact = write_artifact(&temp_dir, "a.pdf", 10).with_scratch(&upload);
        let output = artifact.path.clone();
        registry.register("cpdf_1", artifact).await.unwrap();

        assert!(registry.remove("cpdf_1").await);
        assert!(!output.exists());
        assert!(!upload.exists());
        assert!(matches!(registry.lookup("cpdf_1").await, Err(JobError::NotFound(_))));

        // Removing again is harmless
        assert!(!registry.remove("cpdf_1").await);
    }

    #[tokio::test]
    async fn test_remove_survives_missing_files() {
        let registry = JobRegistry::new(Arc::new(MemoryJobStore::new()));
        registry
            .register("cpdf_1", Artifact::document("/nonexistent/a.pdf", 1, "a.pdf"))
            .await
            .unwrap();

        assert!(registry.remove("cpdf_1").await);
        assert!(registry.lookup("cpdf_1").await.is_err());
    }
}
