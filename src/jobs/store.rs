//! Job Store
//!
//! Persistence for job records behind a small key-value interface, so the
//! lifecycle logic does not care whether records live on disk or in memory.
//! Every record is an independent unit and is only ever written whole.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{is_valid_job_id, JobError, JobRecord};

// ============================================================================
// Store Trait
// ============================================================================

/// Trait for job record backends
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a record, failing with `DuplicateJob` if the id is taken
    async fn insert_new(&self, record: &JobRecord) -> Result<(), JobError>;

    /// Fetch a record by id
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobError>;

    /// Delete a record; returns whether it existed
    async fn delete(&self, job_id: &str) -> Result<bool, JobError>;

    /// Enumerate the stored records
    async fn list(&self) -> Result<Vec<StoredEntry>, JobError>;

    /// Delete an entry by the key `list` reported for it; returns whether it
    /// existed
    ///
    /// Listed keys need not be valid job ids: a unit can be stored under a
    /// name that disagrees with its contents, or under a name no job id
    /// could produce.
    async fn delete_listed(&self, key: &str) -> Result<bool, JobError> {
        self.delete(key).await
    }
}

/// One entry seen while enumerating a store
#[derive(Debug)]
pub enum StoredEntry {
    Record { key: String, record: JobRecord },
    /// A unit that exists but no longer parses as a record
    Corrupt { key: String },
}

impl StoredEntry {
    /// Storage key this entry was found under
    pub fn key(&self) -> &str {
        match self {
            Self::Record { key, .. } | Self::Corrupt { key } => key,
        }
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Map-backed store, used by tests and single-shot tools
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    records: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_new(&self, record: &JobRecord) -> Result<(), JobError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.job_id) {
            return Err(JobError::DuplicateJob(record.job_id.clone()));
        }
        records.insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobError> {
        Ok(self.records.read().await.get(job_id).cloned())
    }

    async fn delete(&self, job_id: &str) -> Result<bool, JobError> {
        Ok(self.records.write().await.remove(job_id).is_some())
    }

    async fn list(&self) -> Result<Vec<StoredEntry>, JobError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .map(|(key, record)| StoredEntry::Record {
                key: key.clone(),
                record: record.clone(),
            })
            .collect())
    }
}

// ============================================================================
// Directory Store
// ============================================================================

/// One JSON file per job id inside an index directory
///
/// Records are written to a temp file and hard-linked into place. The link
/// fails if the id already exists, so duplicate detection and publication
/// are a single atomic step and readers never see a partial record.
#[derive(Clone)]
pub struct DirectoryJobStore {
    dir: PathBuf,
}

impl DirectoryJobStore {
    /// Open (and create if needed) an index directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, JobError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| JobError::Storage(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    fn staging_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!(".{}.{}.tmp", job_id, Uuid::new_v4().simple()))
    }

    async fn remove_record_file(&self, key: &str) -> Result<bool, JobError> {
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(JobError::Storage(e.to_string())),
        }
    }
}

/// Keys `list` can report: plain file stems inside the index directory
fn is_listed_key(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\'])
}

#[async_trait::async_trait]
impl JobStore for DirectoryJobStore {
    async fn insert_new(&self, record: &JobRecord) -> Result<(), JobError> {
        if !is_valid_job_id(&record.job_id) {
            return Err(JobError::Storage(format!("invalid job id: {}", record.job_id)));
        }

        let data = serde_json::to_vec(record).map_err(|e| JobError::Storage(e.to_string()))?;
        let staging = self.staging_path(&record.job_id);
        let target = self.record_path(&record.job_id);

        tokio::fs::write(&staging, &data)
            .await
            .map_err(|e| JobError::Storage(format!("write {}: {}", staging.display(), e)))?;

        let published = tokio::fs::hard_link(&staging, &target).await;
        let _ = tokio::fs::remove_file(&staging).await;

        match published {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(JobError::DuplicateJob(record.job_id.clone()))
            }
            Err(e) => Err(JobError::Storage(format!("publish {}: {}", target.display(), e))),
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, JobError> {
        if !is_valid_job_id(job_id) {
            return Ok(None);
        }

        let data = match tokio::fs::read(self.record_path(job_id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobError::Storage(e.to_string())),
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| JobError::Storage(format!("corrupt record {}: {}", job_id, e)))
    }

    async fn delete(&self, job_id: &str) -> Result<bool, JobError> {
        if !is_valid_job_id(job_id) {
            return Ok(false);
        }
        self.remove_record_file(job_id).await
    }

    async fn delete_listed(&self, key: &str) -> Result<bool, JobError> {
        if !is_listed_key(key) {
            return Ok(false);
        }
        self.remove_record_file(key).await
    }

    async fn list(&self) -> Result<Vec<StoredEntry>, JobError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| JobError::Storage(e.to_string()))?;

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JobError::Storage(e.to_string()))?
        {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json");
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Staging files are hidden and never listed
            if !is_record || !is_listed_key(key) {
                continue;
            }

            // A record may be reaped between listing and reading
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(JobError::Storage(e.to_string())),
            };

            let key = key.to_string();
            match serde_json::from_slice::<JobRecord>(&data) {
                Ok(record) => found.push(StoredEntry::Record { key, record }),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Unreadable job record");
                    found.push(StoredEntry::Corrupt { key });
                }
            }
        }

        Ok(found)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::Artifact;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(job_id: &str) -> JobRecord {
        JobRecord::new(
            job_id,
            Artifact::document("/tmp/a.pdf", 10, "a.pdf"),
            "token".to_string(),
            Utc::now(),
            Duration::minutes(15),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_directory_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryJobStore::open(temp_dir.path().join("index")).await.unwrap();

        let original = record("cpdf_1");
        store.insert_new(&original).await.unwrap();

        let fetched = store.get("cpdf_1").await.unwrap().unwrap();
        assert_eq!(fetched, original);
        assert!(store.dir().join("cpdf_1.json").exists());

        assert!(store.delete("cpdf_1").await.unwrap());
        assert!(!store.delete("cpdf_1").await.unwrap());
        assert!(store.get("cpdf_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_store_rejects_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryJobStore::open(temp_dir.path()).await.unwrap();

        store.insert_new(&record("zip_1")).await.unwrap();
        let mut other = record("zip_1");
        other.token = "different".to_string();

        let result = store.insert_new(&other).await;
        assert!(matches!(result, Err(JobError::DuplicateJob(_))));

        // The original record is untouched and no staging files linger
        assert_eq!(store.get("zip_1").await.unwrap().unwrap().token, "token");
        let leftovers = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_directory_store_lists_corrupt_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryJobStore::open(temp_dir.path()).await.unwrap();

        store.insert_new(&record("cpdf_ok")).await.unwrap();
        std::fs::write(temp_dir.path().join("cpdf_bad.json"), b"{not json").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"ignored").unwrap();

        let entries = store.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .any(|e| matches!(e, StoredEntry::Record { record, .. } if record.job_id == "cpdf_ok")));
        assert!(entries
            .iter()
            .any(|e| matches!(e, StoredEntry::Corrupt { key } if key == "cpdf_bad")));
    }

    #[tokio::test]
    async fn test_directory_store_deletes_by_listed_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryJobStore::open(temp_dir.path()).await.unwrap();

        // A record filed under a name other than its job id, and a corrupt
        // unit whose name is not a valid job id
        let misfiled = serde_json::to_vec(&record("other")).unwrap();
        std::fs::write(temp_dir.path().join("x.json"), misfiled).unwrap();
        std::fs::write(temp_dir.path().join("a.b.json"), b"{").unwrap();

        let mut keys: Vec<_> = store
            .list()
            .await
            .unwrap()
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a.b", "x"]);

        assert!(!store.delete("a.b").await.unwrap());
        assert!(store.delete_listed("a.b").await.unwrap());
        assert!(store.delete_listed("x").await.unwrap());
        assert!(!store.delete_listed("x").await.unwrap());
        assert!(!store.delete_listed("../outside").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_directory_store_ignores_unsafe_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirectoryJobStore::open(temp_dir.path()).await.unwrap();

        assert!(store.get("../outside").await.unwrap().is_none());
        assert!(!store.delete("../outside").await.unwrap());
        assert!(store.insert_new(&record("../outside")).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicates() {
        let store = MemoryJobStore::new();
        store.insert_new(&record("a")).await.unwrap();
        assert!(matches!(
            store.insert_new(&record("a")).await,
            Err(JobError::DuplicateJob(_))
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
