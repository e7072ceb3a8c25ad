//! Review aggregate (star ratings 1..5)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{read_document, write_document, StatsError};

const REVIEWS_FILE: &str = "reviews.json";

/// Stored aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewAggregate {
    pub count: u64,
    pub sum: u64,
    /// Ratings per star value, keyed "1".."5"
    pub distribution: BTreeMap<String, u64>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ReviewAggregate {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            distribution: (1..=5).map(|n| (n.to_string(), 0)).collect(),
            updated_at: Utc::now(),
        }
    }
}

impl ReviewAggregate {
    /// Average rating rounded to two decimals, 0 when there are none
    pub fn rating_value(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let avg = self.sum as f64 / self.count as f64;
        (avg * 100.0).round() / 100.0
    }
}

/// Public view of the aggregate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub review_count: u64,
    pub rating_value: f64,
    pub distribution: BTreeMap<String, u64>,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl From<ReviewAggregate> for ReviewSummary {
    fn from(agg: ReviewAggregate) -> Self {
        Self {
            review_count: agg.count,
            rating_value: agg.rating_value(),
            distribution: agg.distribution,
            updated_at: agg.updated_at,
        }
    }
}

/// File-backed review aggregate
#[derive(Clone)]
pub struct ReviewStore {
    inner: Arc<ReviewStoreInner>,
}

struct ReviewStoreInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReviewStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(ReviewStoreInner {
                path: data_dir.into().join(REVIEWS_FILE),
                lock: Mutex::new(()),
            }),
        }
    }

    pub async fn aggregate(&self) -> ReviewAggregate {
        read_document(&self.inner.path).await.unwrap_or_default()
    }

    pub async fn summary(&self) -> ReviewSummary {
        self.aggregate().await.into()
    }

    /// Record one rating (1..=5)
    pub async fn submit(&self, rating: i64) -> Result<ReviewSummary, StatsError> {
        if !(1..=5).contains(&rating) {
            return Err(StatsError::InvalidRating(rating));
        }

        let _guard = self.inner.lock.lock().await;

        let mut agg = self.aggregate().await;
        agg.count += 1;
        agg.sum += rating as u64;
        *agg.distribution.entry(rating.to_string()).or_insert(0) += 1;
        agg.updated_at = Utc::now();

        write_document(&self.inner.path, &agg).await?;

        tracing::debug!(rating = rating, count = agg.count, "Recorded review");
        Ok(agg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_aggregate() {
        let temp_dir = TempDir::new().unwrap();
        let summary = ReviewStore::new(temp_dir.path()).summary().await;
        assert_eq!(summary.review_count, 0);
        assert_eq!(summary.rating_value, 0.0);
        assert_eq!(summary.distribution.len(), 5);
    }

    #[tokio::test]
    async fn test_submit_updates_average_and_distribution() {
        let temp_dir = TempDir::new().unwrap();
        let reviews = ReviewStore::new(temp_dir.path());

        reviews.submit(5).await.unwrap();
        reviews.submit(4).await.unwrap();
        let summary = reviews.submit(4).await.unwrap();

        assert_eq!(summary.review_count, 3);
        assert_eq!(summary.rating_value, 4.33);
        assert_eq!(summary.distribution["4"], 2);
        assert_eq!(summary.distribution["5"], 1);
        assert_eq!(summary.distribution["1"], 0);
    }

    #[tokio::test]
    async fn test_out_of_range_rating_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let reviews = ReviewStore::new(temp_dir.path());

        assert!(matches!(reviews.submit(0).await, Err(StatsError::InvalidRating(0))));
        assert!(matches!(reviews.submit(6).await, Err(StatsError::InvalidRating(6))));
        assert_eq!(reviews.aggregate().await.count, 0);
    }

    #[test]
    fn test_summary_serializes_frontend_field_names() {
        let summary: ReviewSummary = ReviewAggregate::default().into();
        let json = serde_json::to_value(summary).unwrap();
        assert!(json.get("reviewCount").is_some());
        assert!(json.get("ratingValue").is_some());
        assert!(json.get("updated_at").is_some());
    }
}
