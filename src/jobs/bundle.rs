//! Bundle Builder
//!
//! Packs the artifacts of several jobs into one zip archive and registers
//! that archive as a new job. Each requested job is validated on its own;
//! invalid ones are skipped without comment.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::registry::JobRegistry;
use super::types::{new_job_id, Artifact, JobError, JobTicket};

/// Job id prefix for bundles
pub const BUNDLE_PREFIX: &str = "zip";

/// A freshly registered bundle job
#[derive(Debug, Clone)]
pub struct BundleJob {
    pub job_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,

    /// Number of artifacts packed into the archive
    pub count: usize,
}

impl BundleJob {
    pub fn download_url(&self) -> String {
        super::types::download_url(&self.job_id, &self.token)
    }
}

/// One validated source artifact
#[derive(Debug, Clone)]
struct BundleEntry {
    path: PathBuf,
    name: String,
}

/// Builds zip bundles into an output directory
#[derive(Clone)]
pub struct BundleBuilder {
    registry: JobRegistry,
    output_dir: PathBuf,
}

impl BundleBuilder {
    pub fn new(registry: JobRegistry, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            output_dir: output_dir.into(),
        }
    }

    /// Bundle the valid tickets with the registry's default TTL
    pub async fn build(&self, items: &[JobTicket]) -> Result<BundleJob, JobError> {
        self.build_with_ttl(items, self.registry.ttl()).await
    }

    /// Bundle the valid tickets into a new job expiring after `ttl`
    ///
    /// The archive is fully written and moved into place before the job is
    /// registered, so nothing can redeem or reap a partial archive.
    pub async fn build_with_ttl(
        &self,
        items: &[JobTicket],
        ttl: Duration,
    ) -> Result<BundleJob, JobError> {
        let entries = self.collect_entries(items).await;
        if entries.is_empty() {
            return Err(JobError::EmptyBundle);
        }

        let job_id = new_job_id(BUNDLE_PREFIX);
        let filename = format!("{}.zip", job_id);
        let staging = self.output_dir.join(format!(".{}.tmp", filename));
        let target = self.output_dir.join(&filename);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| JobError::Archive(e.to_string()))?;

        let staged = staging.clone();
        let written = tokio::task::spawn_blocking(move || write_archive(&staged, &entries))
            .await
            .map_err(|e| JobError::Archive(format!("archive task failed: {}", e)))?;

        let count = match written {
            Ok(0) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(JobError::EmptyBundle);
            }
            Ok(count) => count,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| JobError::Archive(format!("publish {}: {}", target.display(), e)))?;

        let byte_size = tokio::fs::metadata(&target)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let artifact = Artifact::archive(&target, byte_size, filename);
        let issued = match self.registry.register_with_ttl(&job_id, artifact, ttl).await {
            Ok(issued) => issued,
            Err(e) => {
                let _ = tokio::fs::remove_file(&target).await;
                return Err(e);
            }
        };

        tracing::info!(
            job_id = %issued.job_id,
            requested = items.len(),
            count = count,
            bytes = byte_size,
            "Bundle created"
        );

        Ok(BundleJob {
            job_id: issued.job_id,
            token: issued.token,
            expires_at: issued.expires_at,
            count,
        })
    }

    /// Validate each ticket independently, keeping those still redeemable
    async fn collect_entries(&self, items: &[JobTicket]) -> Vec<BundleEntry> {
        let checks = items.iter().map(|item| async move {
            let record = self.registry.validate(&item.job_id, &item.token).await.ok()?;
            let present = tokio::fs::metadata(&record.artifact_path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            present.then(|| BundleEntry {
                path: record.artifact_path,
                name: record.filename,
            })
        });

        let entries: Vec<BundleEntry> = futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect();

        if entries.len() < items.len() {
            tracing::debug!(
                requested = items.len(),
                valid = entries.len(),
                "Skipped invalid bundle items"
            );
        }

        entries
    }
}

// ============================================================================
// Archive Writing
// ============================================================================

/// Write `entries` into a zip at `path`, returning how many were packed
///
/// Sources that vanish before they can be read are skipped.
fn write_archive(path: &Path, entries: &[BundleEntry]) -> Result<usize, JobError> {
    let file = std::fs::File::create(path).map_err(archive_error)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(9));

    let mut taken = HashSet::new();
    let mut count = 0;

    for entry in entries {
        let mut source = match std::fs::File::open(&entry.path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(path = %entry.path.display(), error = %e, "Bundle source vanished");
                continue;
            }
        };

        let name = unique_entry_name(&entry.name, &mut taken);
        writer.start_file(name, options).map_err(archive_error)?;
        std::io::copy(&mut source, &mut writer).map_err(archive_error)?;
        count += 1;
    }

    let mut file = writer.finish().map_err(archive_error)?;
    file.flush().map_err(archive_error)?;
    file.sync_all().map_err(archive_error)?;

    Ok(count)
}

fn archive_error(e: impl std::fmt::Display) -> JobError {
    JobError::Archive(e.to_string())
}

/// Pick an archive entry name, suffixing repeats: `a.pdf`, `a (1).pdf`, ...
fn unique_entry_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================
