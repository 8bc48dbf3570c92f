//! HTTP endpoints for fieldsync-server.
//!
//! Provides the sync and match API plus health checks and metrics.

mod api;
pub mod health;
mod metrics;

use crate::server::FieldSyncServer;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

pub use api::{ApiError, ErrorBody};
pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
///
/// `/metrics` is only mounted when `http.metrics_enabled` is set.
pub fn build_router(server: Arc<FieldSyncServer>) -> Router {
    let mut router = Router::new()
        .route("/sync/:kind", post(api::sync_handler))
        .route("/match", post(api::match_handler))
        .route("/health", get(health::health_handler));

    if server.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(server))
}
