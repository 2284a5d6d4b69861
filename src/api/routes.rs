use crate::api::{handlers, AppState};
use crate::metrics::MetricsLayer;
use axum::{routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health and metrics
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        // Search
        .route("/search", get(handlers::search))
        .route("/v2/search", get(handlers::search_v2))
        .route("/v2/search/grouped", get(handlers::search_grouped))
        .route("/chart", get(handlers::chart))
        // Job listing
        .route("/jobs", get(handlers::list_jobs))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(MetricsLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
