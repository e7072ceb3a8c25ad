//! Stats & Review Routes
//!
//! Endpoints:
//! - GET /v1/compress-pdf/stats, GET /v1/merge-pdf/stats - Tool usage totals
//! - POST /v1/compress-pdf/stats/bump, POST /v1/merge-pdf/stats/bump - Increment a total
//! - GET /v1/compress-pdf/reviews, GET /v1/merge-pdf/reviews - Rating aggregate
//! - POST /v1/reviews - Submit a rating
//! - GET /v1/stats/summary, GET /v1/mergepdf/stats/summary, GET /v1/reviews/summary - Legacy aliases

use std::collections::BTreeMap;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::state::AppState;
use crate::stats::counters::{COMPRESS_PDF, MERGE_PDF};
use crate::stats::{ReviewSummary, StatsError};

const COMPRESS_TOOL: &str = "compress-pdf";
const MERGE_TOOL: &str = "merge-pdf";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CompressStatsResponse {
    pub tool: &'static str,
    pub total_compressed: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MergeStatsResponse {
    pub tool: &'static str,
    pub total_merged: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BumpResponse {
    pub ok: bool,
    pub new_total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolReviewsResponse {
    pub tool: &'static str,
    pub review_count: u64,
    pub rating_value: f64,
    pub distribution: BTreeMap<String, u64>,
    #[serde(rename = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl ToolReviewsResponse {
    fn new(tool: &'static str, summary: ReviewSummary) -> Self {
        Self {
            tool,
            review_count: summary.review_count,
            rating_value: summary.rating_value,
            distribution: summary.distribution,
            updated_at: summary.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    #[serde(default)]
    pub rating: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewResponse {
    pub ok: bool,
    pub review_count: u64,
    pub rating_value: f64,
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/compress-pdf/stats", get(compress_stats))
        .route("/v1/compress-pdf/stats/bump", post(bump_compress))
        .route("/v1/compress-pdf/reviews", get(compress_reviews))
        .route("/v1/merge-pdf/stats", get(merge_stats))
        .route("/v1/merge-pdf/stats/bump", post(bump_merge))
        .route("/v1/merge-pdf/reviews", get(merge_reviews))
        .route("/v1/reviews", post(submit_review))
        .route("/v1/stats/summary", get(compress_stats))
        .route("/v1/mergepdf/stats/summary", get(merge_stats))
        .route("/v1/reviews/summary", get(compress_reviews))
}

// ============================================================================
// Handlers
// ============================================================================

async fn compress_stats(State(state): State<AppState>) -> Json<CompressStatsResponse> {
    let summary = state.counters().summary(COMPRESS_PDF).await;
    Json(CompressStatsResponse {
        tool: COMPRESS_TOOL,
        total_compressed: summary.total,
        updated_at: summary.updated_at,
    })
}

async fn merge_stats(State(state): State<AppState>) -> Json<MergeStatsResponse> {
    let summary = state.counters().summary(MERGE_PDF).await;
    Json(MergeStatsResponse {
        tool: MERGE_TOOL,
        total_merged: summary.total,
        updated_at: summary.updated_at,
    })
}

async fn bump_compress(State(state): State<AppState>) -> Result<Json<BumpResponse>> {
    let summary = state.counters().bump(COMPRESS_PDF).await?;
    Ok(Json(BumpResponse {
        ok: true,
        new_total: summary.total,
    }))
}

async fn bump_merge(State(state): State<AppState>) -> Result<Json<BumpResponse>> {
    let summary = state.counters().bump(MERGE_PDF).await?;
    Ok(Json(BumpResponse {
        ok: true,
        new_total: summary.total,
    }))
}

async fn compress_reviews(State(state): State<AppState>) -> Json<ToolReviewsResponse> {
    Json(ToolReviewsResponse::new(COMPRESS_TOOL, state.reviews().summary().await))
}

async fn merge_reviews(State(state): State<AppState>) -> Json<ToolReviewsResponse> {
    Json(ToolReviewsResponse::new(MERGE_TOOL, state.reviews().summary().await))
}

async fn submit_review(
    State(state): State<AppState>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<Json<SubmitReviewResponse>> {
    let rating = parse_rating(&request.rating).ok_or(StatsError::InvalidRating(0))?;
    let summary = state.reviews().submit(rating).await?;

    Ok(Json(SubmitReviewResponse {
        ok: true,
        review_count: summary.review_count,
        rating_value: summary.rating_value,
    }))
}

/// Integral ratings, given either as a JSON number or a numeric string
fn parse_rating(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating(&json!(4)), Some(4));
        assert_eq!(parse_rating(&json!(5.0)), Some(5));
        assert_eq!(parse_rating(&json!("3")), Some(3));
        assert_eq!(parse_rating(&json!(4.5)), None);
        assert_eq!(parse_rating(&json!(null)), None);
        assert_eq!(parse_rating(&json!("five")), None);
    }
}
