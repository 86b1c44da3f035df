//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes);

    let mut router = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/api/health", get(handlers::health_check))
        // Device read path
        .route("/api/manifest", get(handlers::get_manifest))
        .route("/api/assets", get(handlers::get_asset))
        // Release management
        .route(
            "/api/upload",
            post(handlers::upload_release).layer(upload_limit),
        )
        .route("/api/releases", get(handlers::list_releases))
        .route("/api/releases-by-runtime", get(handlers::releases_by_runtime))
        .route("/api/rollback", post(handlers::rollback))
        // Download tracking
        .route("/api/tracking/all", get(handlers::all_tracking))
        .route("/api/tracking/release", get(handlers::release_tracking));

    // The metrics endpoint must be network-restricted to the scraper when enabled.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
