//! Usage Statistics
//!
//! Small JSON documents in the data directory backing the public counters
//! and review scores shown by the frontends:
//! - `counters`: per-tool totals (`stats-multi.json`)
//! - `reviews`: rating count, sum and distribution (`reviews.json`)
//!
//! Each document is read whole, updated, and replaced whole via a temp file
//! and rename. A missing or unreadable document reads as empty.

pub mod counters;
pub mod reviews;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use counters::{CounterSummary, UsageCounters};
pub use reviews::{ReviewStore, ReviewSummary};

/// Statistics persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("Invalid rating: {0} (must be 1..5)")]
    InvalidRating(i64),

    #[error("Stats IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stats encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StatsError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidRating(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Read a JSON document, or `None` if it is missing or corrupt
async fn read_document<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&data) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable stats file");
            None
        }
    }
}

/// Replace a JSON document atomically
async fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<(), StatsError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let data = serde_json::to_vec(doc)?;
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, &data).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
