//! Background maintenance task.
//!
//! Runs periodically to refresh the location directory and evict idle
//! devices from the rate limiter.

use crate::directory::LocationDirectory;
use crate::limits::RateLimits;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Spawn the maintenance task.
///
/// An interval of 0 disables it. Returns a handle that can be used to abort
/// the task.
pub fn spawn_maintenance_task(
    directory: Arc<LocationDirectory>,
    limits: RateLimits,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if interval_secs == 0 {
            tracing::info!("Location refresh disabled");
            return;
        }

        tracing::info!("Maintenance task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The directory was loaded at startup; skip the immediate tick.
        timer.tick().await;

        loop {
            timer.tick().await;
            run_once(&directory, &limits).await;
        }
    })
}

/// One maintenance pass.
pub async fn run_once(directory: &LocationDirectory, limits: &RateLimits) {
    match directory.refresh().await {
        Ok(count) => tracing::info!("Location directory refreshed ({} locations)", count),
        Err(e) => tracing::error!("Location refresh error: {}", e),
    }
    limits.shrink();
}
