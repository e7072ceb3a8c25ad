//! Reaper
//!
//! Periodically deletes expired jobs together with their files. A sweep is
//! a plain async call so it can be driven directly; `Reaper::start` wraps it
//! in an interval task owned by whoever holds the returned handle.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::{discard_files, JobRegistry};
use super::store::{JobStore, StoredEntry};
use super::types::JobError;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records looked at
    pub examined: usize,

    /// Records deleted
    pub reaped: usize,

    /// Files that could not be deleted
    pub file_failures: usize,
}

/// Sweeps expired jobs out of a registry
#[derive(Clone)]
pub struct Reaper {
    registry: JobRegistry,
}

impl Reaper {
    pub fn new(registry: JobRegistry) -> Self {
        Self { registry }
    }

    /// Sweep against the current time
    pub async fn sweep(&self) -> Result<SweepReport, JobError> {
        self.sweep_at(Utc::now()).await
    }

    /// Delete every job with `now > expires_at`
    ///
    /// File deletion is best effort and never stops the record from being
    /// removed or the sweep from moving on. Records that no longer parse are
    /// removed as well.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, JobError> {
        let store = self.registry.store();
        let entries = store.list().await?;
        let mut report = SweepReport {
            examined: entries.len(),
            ..SweepReport::default()
        };

        for entry in entries {
            if let StoredEntry::Record { record, .. } = &entry {
                if !record.is_expired_at(now) {
                    continue;
                }
                report.file_failures += discard_files(record).await;
            }

            let key = entry.key();
            match store.delete_listed(key).await {
                Ok(true) => {
                    report.reaped += 1;
                    tracing::debug!(key = %key, "Reaped expired job");
                }
                Ok(false) => {
                    tracing::debug!(key = %key, "Expired job already gone");
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to delete expired job record");
                }
            }
        }

        if report.reaped > 0 {
            tracing::info!(
                reaped = report.reaped,
                examined = report.examined,
                file_failures = report.file_failures,
                "Reaped expired jobs"
            );
        }

        Ok(report)
    }

    /// Start the background sweep task
    pub fn start(self, interval: StdDuration) -> ReaperHandle {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            tracing::error!(error = %e, "Reaper sweep failed");
                        }
                    }
                }
            }

            tracing::debug!("Reaper stopped");
        });

        tracing::info!(interval_secs = interval.as_secs(), "Reaper started");

        ReaperHandle { cancel, task }
    }
}

/// Owner handle for a running reaper task
pub struct ReaperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the task and wait for an in-flight sweep to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Reaper task ended abnormally");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
