//! Route configuration.

use crate::auth::{require_admin, trace_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/v1/admin/versions", post(handlers::register_version))
        .route(
            "/v1/admin/versions/{package_type}/{package_scope}/{package_name}/{version_number}",
            get(handlers::get_version),
        )
        .route("/v1/admin/publish-keys", post(handlers::create_publish_key))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api_routes = Router::new()
        .route("/", get(handlers::api_root))
        // Health check (unauthenticated for load balancers and liveness checks)
        .route("/v1/health", get(handlers::health_check))
        // The decoder enforces upload.max_archive_size while streaming
        .route(
            "/v1/publish",
            post(handlers::publish).layer(DefaultBodyLimit::disable()),
        )
        .merge(admin_routes);

    let mut router = Router::new()
        .route("/", get(handlers::home))
        .nest("/api", api_routes);

    // When enabled, /metrics MUST be network-restricted to Prometheus scrapers.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
