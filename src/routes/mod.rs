//! Route modules for the PDF Tools server

pub mod health;
pub mod jobs;
pub mod stats;
pub mod tools;

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CorsConfig;
use crate::state::AppState;

/// Build the application router over a state
pub fn app(state: AppState) -> Router {
    let tools_config = state.config().tools.clone();

    Router::new()
        .nest("/health", health::router())
        .nest("/v1/jobs", jobs::router())
        .nest("/v1/pdf", tools::router(&tools_config))
        .merge(stats::router())
        .with_state(state)
}

/// CORS layer restricted to the configured origins
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}
