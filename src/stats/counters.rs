//! Per-tool usage counters

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{read_document, write_document, StatsError};

/// Counter key for the compress tool
pub const COMPRESS_PDF: &str = "compresspdf";

/// Counter key for the merge tool
pub const MERGE_PDF: &str = "mergepdf";

const COUNTERS_FILE: &str = "stats-multi.json";

/// One tool's counter as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(default)]
    pub total: u64,
    pub updated_at: DateTime<Utc>,
}

impl Counter {
    fn empty() -> Self {
        Self {
            total: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Summary returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct CounterSummary {
    pub app: String,
    pub total: u64,
    pub updated_at: DateTime<Utc>,
}

/// File-backed counters keyed by tool
#[derive(Clone)]
pub struct UsageCounters {
    inner: Arc<UsageCountersInner>,
}

struct UsageCountersInner {
    path: PathBuf,

    /// Serialises read-modify-write cycles
    lock: Mutex<()>,
}

impl UsageCounters {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(UsageCountersInner {
                path: data_dir.into().join(COUNTERS_FILE),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Entries are kept as raw JSON so one malformed tool entry does not
    /// cost the others their totals
    async fn read_all(&self) -> BTreeMap<String, Value> {
        read_document(&self.inner.path).await.unwrap_or_default()
    }

    fn parse_counter(app: &str, entry: Value) -> Option<Counter> {
        match serde_json::from_value(entry) {
            Ok(counter) => Some(counter),
            Err(e) => {
                tracing::warn!(app = %app, error = %e, "Ignoring unreadable usage counter");
                None
            }
        }
    }

    /// Increment a tool's counter, returning its new state
    pub async fn bump(&self, app: &str) -> Result<CounterSummary, StatsError> {
        let _guard = self.inner.lock.lock().await;

        let mut all = self.read_all().await;
        let mut counter = all
            .remove(app)
            .and_then(|entry| Self::parse_counter(app, entry))
            .unwrap_or_else(Counter::empty);
        counter.total += 1;
        counter.updated_at = Utc::now();
        let summary = CounterSummary {
            app: app.to_string(),
            total: counter.total,
            updated_at: counter.updated_at,
        };

        all.insert(app.to_string(), serde_json::to_value(&counter)?);
        write_document(&self.inner.path, &all).await?;

        tracing::debug!(app = %app, total = summary.total, "Bumped usage counter");
        Ok(summary)
    }

    /// Current state of a tool's counter (zero if never bumped)
    pub async fn summary(&self, app: &str) -> CounterSummary {
        let counter = self
            .read_all()
            .await
            .remove(app)
            .and_then(|entry| Self::parse_counter(app, entry))
            .unwrap_or_else(Counter::empty);
        CounterSummary {
            app: app.to_string(),
            total: counter.total,
            updated_at: counter.updated_at,
        }
    }

    /// Bump without failing the caller; producers use this after success
    pub async fn bump_quietly(&self, app: &str) {
        if let Err(e) = self.bump(app).await {
            tracing::error!(app = %app, error = %e, "Failed to bump usage counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_counters_start_at_zero() {
        let temp_dir = TempDir::new().unwrap();
        let counters = UsageCounters::new(temp_dir.path());
        assert_eq!(counters.summary(MERGE_PDF).await.total, 0);
    }

    #[tokio::test]
    async fn test_bump_is_per_tool_and_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let counters = UsageCounters::new(temp_dir.path());

        counters.bump(MERGE_PDF).await.unwrap();
        counters.bump(MERGE_PDF).await.unwrap();
        let compress = counters.bump(COMPRESS_PDF).await.unwrap();
        assert_eq!(compress.total, 1);

        let reopened = UsageCounters::new(temp_dir.path());
        assert_eq!(reopened.summary(MERGE_PDF).await.total, 2);
        assert_eq!(reopened.summary(COMPRESS_PDF).await.total, 1);
    }

    #[tokio::test]
    async fn test_concurrent_bumps_are_not_lost() {
        let temp_dir = TempDir::new().unwrap();
        let counters = UsageCounters::new(temp_dir.path());

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let counters = counters.clone();
                tokio::spawn(async move { counters.bump(COMPRESS_PDF).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(counters.summary(COMPRESS_PDF).await.total, 20);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(COUNTERS_FILE), b"garbage").unwrap();

        let counters = UsageCounters::new(temp_dir.path());
        assert_eq!(counters.summary(MERGE_PDF).await.total, 0);
        assert_eq!(counters.bump(MERGE_PDF).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_does_not_reset_other_tools() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(COUNTERS_FILE),
            br#"{
                "compresspdf": {"total": "many"},
                "mergepdf": {"total": 41, "updated_at": "2024-05-01T12:00:00Z"}
            }"#,
        )
        .unwrap();

        let counters = UsageCounters::new(temp_dir.path());
        assert_eq!(counters.summary(MERGE_PDF).await.total, 41);
        assert_eq!(counters.summary(COMPRESS_PDF).await.total, 0);

        assert_eq!(counters.bump(COMPRESS_PDF).await.unwrap().total, 1);
        assert_eq!(counters.summary(MERGE_PDF).await.total, 41);
        assert_eq!(counters.bump(MERGE_PDF).await.unwrap().total, 42);
    }
}
