//! Rate limiting for fieldsync-server.
//!
//! Field devices sync over shared, often NATed mobile links, so the client
//! IP says little about who is calling. Requests are limited by:
//! - **DeviceId** for sync and match calls that name a device
//! - a global limiter capping aggregate throughput
//!
//! Both use the governor crate; the keyed limiter is backed by DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use sync_types::DeviceId;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits requests per DeviceId (`limits.requests_per_minute`).
    device_limiter: Arc<KeyedLimiter<DeviceId>>,

    /// Global rate limiter across all devices (`limits.global_requests_per_second`).
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("device_limiter", &"KeyedLimiter<DeviceId>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// A configured rate of zero is treated as one.
    pub fn new(config: &LimitsConfig) -> Self {
        let device_quota = Quota::per_minute(at_least_one(config.requests_per_minute));
        let global_quota = Quota::per_second(at_least_one(config.global_requests_per_second));

        Self {
            device_limiter: Arc::new(RateLimiter::keyed(device_quota)),
            global_limiter: Arc::new(RateLimiter::direct(global_quota)),
        }
    }

    /// Check a request from an optional device.
    ///
    /// The global limit is always checked; the per-device limit only when
    /// the request names a device.
    pub fn check_request(&self, device: Option<&DeviceId>) -> Result<(), RateLimitError> {
        self.check_global()?;
        match device {
            Some(device) => self.check_device(device),
            None => Ok(()),
        }
    }

    /// Check if a device is within its request quota.
    pub fn check_device(&self, device: &DeviceId) -> Result<(), RateLimitError> {
        self.device_limiter
            .check_key(device)
            .map_err(|_| RateLimitError::DeviceLimitExceeded)
    }

    /// Check if the global request rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Get the number of tracked device keys (for metrics).
    pub fn device_keys_count(&self) -> usize {
        self.device_limiter.len()
    }

    /// Evict idle devices from the keyed limiter.
    ///
    /// Entries whose cells have fully recharged are dropped. Called from the
    /// maintenance task.
    pub fn shrink(&self) {
        self.device_limiter.retain_recent();
    }
}

fn at_least_one(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many requests from this device.
    #[error("device rate limit exceeded")]
    DeviceLimitExceeded,
    /// Global request rate exceeded across all devices.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(requests_per_minute: u32, global_requests_per_second: u32) -> LimitsConfig {
        LimitsConfig {
            requests_per_minute,
            global_requests_per_second,
        }
    }

    #[test]
    fn create_rate_limits() {
        let limits = RateLimits::new(&config(10, 100));
        assert_eq!(limits.device_keys_count(), 0);
    }

    #[test]
    fn device_limit_allows_within_quota() {
        let limits = RateLimits::new(&config(5, 1000));
        let device = DeviceId::new("tablet-1");

        for _ in 0..5 {
            assert!(limits.check_device(&device).is_ok());
        }

        assert_eq!(
            limits.check_device(&device),
            Err(RateLimitError::DeviceLimitExceeded)
        );
    }

    #[test]
    fn different_devices_have_independent_limits() {
        let limits = RateLimits::new(&config(2, 1000));
        let device_a = DeviceId::new("tablet-a");
        let device_b = DeviceId::new("tablet-b");

        assert!(limits.check_request(Some(&device_a)).is_ok());
        assert!(limits.check_request(Some(&device_a)).is_ok());
        assert!(limits.check_request(Some(&device_a)).is_err());

        assert!(limits.check_request(Some(&device_b)).is_ok());
        assert!(limits.check_request(Some(&device_b)).is_ok());
        assert!(limits.check_request(Some(&device_b)).is_err());
        assert_eq!(limits.device_keys_count(), 2);
    }

    #[test]
    fn anonymous_requests_only_hit_global_limit() {
        let limits = RateLimits::new(&config(1, 3));

        for _ in 0..3 {
            assert!(limits.check_request(None).is_ok());
        }
        assert_eq!(
            limits.check_request(None),
            Err(RateLimitError::GlobalLimitExceeded)
        );
        assert_eq!(limits.device_keys_count(), 0);
    }

    #[test]
    fn zero_rate_is_treated_as_one() {
        let limits = RateLimits::new(&config(0, 0));
        assert!(limits.check_global().is_ok());
        assert!(limits.check_global().is_err());
    }

    #[test]
    fn rate_limit_error_display() {
        assert_eq!(
            RateLimitError::DeviceLimitExceeded.to_string(),
            "device rate limit exceeded"
        );
        assert_eq!(
            RateLimitError::GlobalLimitExceeded.to_string(),
            "global rate limit exceeded"
        );
    }

    #[test]
    fn shrink_does_not_panic() {
        let limits = RateLimits::new(&config(10, 100));
        let _ = limits.check_device(&DeviceId::new("tablet-1"));
        assert!(limits.device_keys_count() > 0);

        // Fresh entries may or may not be evicted depending on timing.
        limits.shrink();
    }
}
