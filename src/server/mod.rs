pub mod handlers;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

use crate::middleware::timing;
use crate::service::MetricsService;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Update semantics, signature checks and persistence policy.
    pub service: Arc<MetricsService>,
}

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Listing & liveness ──────────────────────────────────
        .route("/", get(handlers::list_metrics))
        .route("/ping", get(handlers::ping))
        // ── Updates ─────────────────────────────────────────────
        .route("/update", post(handlers::update_json))
        .route("/update/", post(handlers::update_json))
        .route(
            "/update/:kind/:name/:value",
            post(handlers::update_path),
        )
        .route("/updates", post(handlers::update_batch))
        .route("/updates/", post(handlers::update_batch))
        // ── Queries ─────────────────────────────────────────────
        .route("/value", post(handlers::value_json))
        .route("/value/", post(handlers::value_json))
        .route("/value/:kind/:name", get(handlers::value_text))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
}
