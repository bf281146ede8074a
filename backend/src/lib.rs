//! Query execution plan diagnostics
//!
//! Condenses per-operator profiler statistics into a bounded, classified
//! payload. The engine lives in [`services::operator_stats`]; the HTTP surface
//! in [`handlers`].

pub mod config;
pub mod handlers;
pub mod services;
pub mod utils;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared, read-only application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: config::Config,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/queries/:query_id/operator-stats/analyze",
            post(handlers::operator_stats::analyze_operator_stats),
        )
        .route("/health", get(handlers::operator_stats::health))
        .route("/api-docs/openapi.json", get(handlers::operator_stats::openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
