//! Router construction.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::state::AppState;

/// Builds the service router around shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Load tests
        .route("/k6/run", post(handlers::run::run_test_handler))
        // API definition
        .route("/api", get(handlers::api::api_handler))
        // Health and metrics
        .route("/health", get(handlers::health::health_handler))
        .route("/status", get(handlers::health::status_handler))
        .route("/metrics", get(handlers::health::metrics_handler))
        // Middleware
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
