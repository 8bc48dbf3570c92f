//! Prometheus metrics endpoint.

use crate::server::FieldSyncServer;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(
    Extension(server): Extension<Arc<FieldSyncServer>>,
) -> impl IntoResponse {
    let m = server.metrics();

    // Gauges
    let locations = server.directory().snapshot().await.len();
    let tracked_devices = server.rate_limits().device_keys_count();

    // Counters
    let syncs = m.syncs_total.load(Ordering::Relaxed);
    let matches = m.matches_total.load(Ordering::Relaxed);
    let delivered = m.records_delivered.load(Ordering::Relaxed);
    let invalid = m.validation_failures.load(Ordering::Relaxed);
    let degraded = m.oracle_degraded.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP fieldsync_locations Locations in the cached directory
# TYPE fieldsync_locations gauge
fieldsync_locations {locations}

# HELP fieldsync_rate_limited_devices Devices tracked by the rate limiter
# TYPE fieldsync_rate_limited_devices gauge
fieldsync_rate_limited_devices {tracked_devices}

# HELP fieldsync_info Server information
# TYPE fieldsync_info gauge
fieldsync_info{{version="{version}"}} 1

# HELP fieldsync_syncs_total Sync calls served
# TYPE fieldsync_syncs_total counter
fieldsync_syncs_total {syncs}

# HELP fieldsync_matches_total Match calls served
# TYPE fieldsync_matches_total counter
fieldsync_matches_total {matches}

# HELP fieldsync_records_delivered_total Delta records delivered to devices
# TYPE fieldsync_records_delivered_total counter
fieldsync_records_delivered_total {delivered}

# HELP fieldsync_validation_failures_total Requests rejected as invalid
# TYPE fieldsync_validation_failures_total counter
fieldsync_validation_failures_total {invalid}

# HELP fieldsync_oracle_degraded_total Match calls answered without biometrics
# TYPE fieldsync_oracle_degraded_total counter
fieldsync_oracle_degraded_total {degraded}

# HELP fieldsync_rate_limit_hits_total Total rate limit rejections
# TYPE fieldsync_rate_limit_hits_total counter
fieldsync_rate_limit_hits_total {rate_limits}

# HELP fieldsync_errors_total Requests failed for other reasons
# TYPE fieldsync_errors_total counter
fieldsync_errors_total {errors}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
