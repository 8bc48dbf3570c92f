//! Main FieldSyncServer coordination.
//!
//! FieldSyncServer owns the location directory and both engines, and applies
//! rate limits and metrics around every request.

use crate::config::Config;
use crate::directory::LocationDirectory;
use crate::error::{Result, ServerError};
use crate::limits::RateLimits;
use crate::matcher::RecordLinkageMatcher;
use crate::oracle::BiometricOracle;
use crate::storage::RecordStore;
use crate::sync::SyncService;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sync_core::MatchPolicy;
use sync_types::{MatchRequest, MatchResult, RecordKind, SyncError, SyncRequest, SyncResponse};

/// Operational metrics for monitoring server activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Sync calls served successfully.
    pub syncs_total: AtomicU64,
    /// Match calls served successfully.
    pub matches_total: AtomicU64,
    /// Delta records delivered to devices.
    pub records_delivered: AtomicU64,
    /// Requests rejected as invalid.
    pub validation_failures: AtomicU64,
    /// Match calls whose biometric step degraded.
    pub oracle_degraded: AtomicU64,
    /// Rate limit rejections (device + global).
    pub rate_limit_hits: AtomicU64,
    /// Requests failed for any other reason (not found, storage, ...).
    pub errors_total: AtomicU64,
}

impl ServerMetrics {
    fn record_failure(&self, err: &ServerError) {
        let counter = match err {
            ServerError::Request(SyncError::Validation(_)) => &self.validation_failures,
            ServerError::RateLimited { .. } => &self.rate_limit_hits,
            _ => &self.errors_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main server.
pub struct FieldSyncServer {
    config: Config,
    directory: Arc<LocationDirectory>,
    sync: SyncService,
    matcher: RecordLinkageMatcher,
    /// Rate limiters for devices and aggregate load.
    rate_limits: RateLimits,
    /// Operational metrics (counters).
    metrics: ServerMetrics,
}

impl std::fmt::Debug for FieldSyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSyncServer")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl FieldSyncServer {
    /// Create a server over a store and a matching service.
    ///
    /// Loads the location directory from the store.
    pub async fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        oracle: Arc<dyn BiometricOracle>,
    ) -> Result<Self> {
        let directory = Arc::new(LocationDirectory::load(store.clone()).await?);
        let sync = SyncService::new(store.clone(), directory.clone(), config.sync.max_limit);
        let policy = MatchPolicy {
            mfa_enabled: config.matching.mfa_enabled,
            country_isolation: config.matching.country_isolation,
        };
        let matcher = RecordLinkageMatcher::new(
            store,
            oracle,
            directory.clone(),
            policy,
            config.matching.oracle_timeout(),
        );
        let rate_limits = RateLimits::new(&config.limits);

        Ok(Self {
            config,
            directory,
            sync,
            matcher,
            rate_limits,
            metrics: ServerMetrics::default(),
        })
    }

    /// Get the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a clone of the directory Arc for background tasks.
    pub fn directory(&self) -> Arc<LocationDirectory> {
        self.directory.clone()
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Serve a sync call for one record kind.
    pub async fn sync(&self, kind: RecordKind, request: &SyncRequest) -> Result<SyncResponse> {
        let result = self.sync_inner(kind, request).await;
        match &result {
            Ok(response) => {
                self.metrics.syncs_total.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .records_delivered
                    .fetch_add(response.records.len() as u64, Ordering::Relaxed);
            }
            Err(e) => self.metrics.record_failure(e),
        }
        result
    }

    async fn sync_inner(&self, kind: RecordKind, request: &SyncRequest) -> Result<SyncResponse> {
        self.check_rate(sync_core::requesting_device(request))?;
        self.sync.sync(kind, request).await
    }

    /// Serve a match call.
    pub async fn find_matches(&self, request: &MatchRequest) -> Result<Vec<MatchResult>> {
        let result = match self.check_rate(None) {
            Ok(()) => self.matcher.find_matches(request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => {
                self.metrics.matches_total.fetch_add(1, Ordering::Relaxed);
                if report.degraded {
                    self.metrics.oracle_degraded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(report.results)
            }
            Err(e) => {
                self.metrics.record_failure(&e);
                Err(e)
            }
        }
    }

    fn check_rate(&self, device: Option<&sync_types::DeviceId>) -> Result<()> {
        self.rate_limits.check_request(device).map_err(|e| {
            tracing::debug!("Rate limited (device={:?}): {}", device, e);
            ServerError::RateLimited {
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::oracle::{MockOracle, OracleError, UnavailableOracle};
    use crate::storage::{SqliteStore, StoredParticipant};
    use std::collections::BTreeSet;
    use sync_types::{DeviceId, Location, LocationId, LocationScope, Provenance, RecordId, Template};

    async fn store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store
            .upsert_location(&Location {
                id: LocationId::new("be-1"),
                name: Some("Antwerp".into()),
                country: Some("Belgium".into()),
                cluster: None,
            })
            .await
            .unwrap();
        store
    }

    async fn server_with(config: Config, oracle: Arc<dyn BiometricOracle>) -> FieldSyncServer {
        FieldSyncServer::new(config, store().await, oracle).await.unwrap()
    }

    fn sync_request(device: Option<&str>) -> SyncRequest {
        SyncRequest {
            scope: LocationScope::country("Belgium"),
            known_at_cursor: Some(BTreeSet::new()),
            limit: 10,
            device_id: device.map(DeviceId::new),
            ..SyncRequest::default()
        }
    }

    #[tokio::test]
    async fn sync_updates_metrics() {
        let server = server_with(Config::default(), Arc::new(UnavailableOracle)).await;

        server
            .sync(RecordKind::Visit, &sync_request(None))
            .await
            .unwrap();
        assert_eq!(server.metrics().syncs_total.load(Ordering::Relaxed), 1);

        let mut bad = sync_request(None);
        bad.limit = -1;
        assert!(server.sync(RecordKind::Visit, &bad).await.is_err());
        assert_eq!(server.metrics().validation_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn device_rate_limit_rejects_excess_syncs() {
        let config = Config {
            limits: LimitsConfig {
                requests_per_minute: 2,
                global_requests_per_second: 1000,
            },
            ..Config::default()
        };
        let server = server_with(config, Arc::new(UnavailableOracle)).await;
        let request = sync_request(Some("tablet-1"));

        assert!(server.sync(RecordKind::Visit, &request).await.is_ok());
        assert!(server.sync(RecordKind::Visit, &request).await.is_ok());
        let err = server.sync(RecordKind::Visit, &request).await.unwrap_err();

        assert!(matches!(err, ServerError::RateLimited { .. }));
        assert_eq!(server.metrics().rate_limit_hits.load(Ordering::Relaxed), 1);

        // Other devices are unaffected.
        assert!(server
            .sync(RecordKind::Visit, &sync_request(Some("tablet-2")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn degraded_matches_are_counted() {
        let store = store().await;
        let participant = StoredParticipant {
            id: RecordId::new(),
            location_id: Some(LocationId::new("be-1")),
            external_id: Some("P-1".into()),
            phone: None,
            voided: false,
        };
        store.upsert_participant(&participant).await.unwrap();

        let oracle = MockOracle::new();
        oracle.fail_next(OracleError::RequestFailed("down".into()));
        let server = FieldSyncServer::new(Config::default(), store, Arc::new(oracle))
            .await
            .unwrap();

        let results = server
            .find_matches(&MatchRequest {
                external_id: Some("P-1".into()),
                template: Some(Template::new(vec![1; 4])),
                ..MatchRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provenance, Provenance::OpenmrsOnly);
        assert_eq!(server.metrics().matches_total.load(Ordering::Relaxed), 1);
        assert_eq!(server.metrics().oracle_degraded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn directory_is_loaded_at_startup() {
        let server = server_with(Config::default(), Arc::new(UnavailableOracle)).await;
        assert_eq!(server.directory().snapshot().await.len(), 1);
    }
}
