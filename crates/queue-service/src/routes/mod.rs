//! HTTP routes for the queue service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_caller};
use crate::services::QueueEngine;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Queue engine shared with the background sweepers.
    pub engine: QueueEngine,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (checks DB) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/v1/office-hours/:id/queue/...` - queue operations, caller identity required
/// - `/api/v1/queue/scan` - QR check-in, caller identity required
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            "/api/v1/office-hours/:id/queue",
            get(handlers::get_provider_view),
        )
        .route(
            "/api/v1/office-hours/:id/queue/join",
            post(handlers::join_queue),
        )
        .route(
            "/api/v1/office-hours/:id/queue/me",
            get(handlers::get_my_status),
        )
        .route(
            "/api/v1/office-hours/:id/queue/call-next",
            post(handlers::call_next),
        )
        .route(
            "/api/v1/office-hours/:id/queue/complete",
            post(handlers::complete_current),
        )
        .route(
            "/api/v1/office-hours/:id/queue/no-show",
            post(handlers::mark_no_show),
        )
        .route("/api/v1/queue/scan", post(handlers::scan_qr))
        .route_layer(middleware::from_fn(require_caller))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. http_metrics_middleware (outermost, sees every response)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
