//! Router configuration for the web server (spec §6).
//!
//! Grounded on the teacher's `server/routes.rs` single-table
//! `Router::new().route(...).layer(CorsLayer).with_state(state)` shape,
//! with the CORS layer built from `Settings::cors_origins` instead of
//! `permissive()` (spec §6 "configured origin allow-list").

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors(&state);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/stats", get(handlers::stats))
        .route("/api/sources", get(handlers::sources))
        .route("/api/search", get(handlers::search_handler))
        .route("/api/snapshot/:id", get(handlers::snapshot_detail))
        .route("/api/snapshots/raw/:id", get(handlers::snapshot_raw))
        .route("/api/snapshots/:id/timeline", get(handlers::snapshot_timeline))
        .route("/api/changes", get(handlers::changes_for_group))
        .route("/api/changes/compare", get(handlers::changes_compare))
        .route("/api/admin/jobs", get(handlers::admin_jobs))
        .route("/api/admin/jobs/:id", get(handlers::admin_job_detail))
        .route("/api/admin/jobs/:id/snapshots", get(handlers::admin_job_snapshots))
        .route("/api/admin/jobs/status-counts", get(handlers::admin_job_status_counts))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .with_state(state)
}

/// Development with no configured origins falls back to permissive CORS
/// (spec §6); staging/production name an explicit allow-list.
fn build_cors(state: &AppState) -> CorsLayer {
    if state.settings.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = state
        .settings
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new().allow_origin(origins).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
}
