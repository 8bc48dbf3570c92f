//! Health check endpoint.

use crate::server::FieldSyncServer;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Locations in the cached directory.
    pub locations: usize,
    /// Whether a biometric matching service is configured.
    pub oracle_configured: bool,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
pub async fn health_handler(
    Extension(server): Extension<Arc<FieldSyncServer>>,
) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        locations: server.directory().snapshot().await.len(),
        oracle_configured: server.config().matching.oracle_url.is_some(),
        uptime_seconds: uptime,
    })
}
