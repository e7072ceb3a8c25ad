//! Application state management

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::jobs::{BundleBuilder, DirectoryJobStore, JobError, JobRegistry, JobStore, Reaper};
use crate::stats::{ReviewStore, UsageCounters};
use crate::tools::Ghostscript;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to open job index: {0}")]
    JobIndex(#[from] JobError),

    #[error("Failed to create directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    registry: JobRegistry,
    bundles: BundleBuilder,
    counters: UsageCounters,
    reviews: ReviewStore,
    ghostscript: Ghostscript,
    started_at: Instant,
}

impl AppState {
    /// Create application state backed by the configured directories
    ///
    /// Creates the data, upload and artifact directories and opens the job
    /// index directory.
    pub async fn new(config: Config) -> Result<Self, StateError> {
        for dir in [
            &config.paths.data_dir,
            &config.paths.upload_dir,
            &config.paths.tmp_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }

        let store = DirectoryJobStore::open(&config.paths.index_dir).await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Create application state over an explicit job store
    pub fn with_store(config: Config, store: Arc<dyn JobStore>) -> Self {
        let registry = JobRegistry::with_ttl(store, config.jobs.ttl());
        let bundles = BundleBuilder::new(registry.clone(), config.paths.tmp_dir.clone());
        let counters = UsageCounters::new(config.paths.data_dir.clone());
        let reviews = ReviewStore::new(config.paths.data_dir.clone());
        let ghostscript = Ghostscript::new(
            config.tools.ghostscript_binary.clone(),
            config.tools.ghostscript_timeout(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                registry,
                bundles,
                counters,
                reviews,
                ghostscript,
                started_at: Instant::now(),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the job registry
    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn bundles(&self) -> &BundleBuilder {
        &self.inner.bundles
    }

    pub fn counters(&self) -> &UsageCounters {
        &self.inner.counters
    }

    pub fn reviews(&self) -> &ReviewStore {
        &self.inner.reviews
    }

    pub fn ghostscript(&self) -> &Ghostscript {
        &self.inner.ghostscript
    }

    /// Seconds since the state was created
    pub fn uptime_secs(&self) -> f64 {
        self.inner.started_at.elapsed().as_secs_f64()
    }

    /// A reaper over this state's registry
    pub fn reaper(&self) -> Reaper {
        Reaper::new(self.inner.registry.clone())
    }
}
