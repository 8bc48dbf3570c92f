//! Record-linkage identity matching.
//!
//! A match request carries any of a phone number, an external identifier and
//! a fingerprint template. The matcher searches the record store by the
//! biographic keys, optionally restricts the hits to one country, asks the
//! biometric matching service about the template, and fans both kinds of
//! evidence into one provenance-tagged result per identity.
//!
//! The matching service is never allowed to fail a request: errors and
//! timeouts become [`BiometricOutcome::Degraded`], which contributes no
//! candidates.

use crate::directory::LocationDirectory;
use crate::error::Result;
use crate::oracle::{BiometricOracle, BiometricOutcome, OracleError};
use crate::storage::RecordStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use sync_core::linkage::{
    biometric_only, dedup_results, fan_in, isolate_country, merge_biographic,
};
use sync_core::{BiographicHit, BiometricQuery, MatchPolicy};
use sync_types::{MatchCandidate, MatchRequest, MatchResult, Template};

/// Results of one match request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    /// One result per distinct identity.
    pub results: Vec<MatchResult>,
    /// Whether the biometric step failed and was treated as empty.
    pub degraded: bool,
}

/// Identity matcher combining record-store searches with a biometric service.
pub struct RecordLinkageMatcher {
    store: Arc<dyn RecordStore>,
    oracle: Arc<dyn BiometricOracle>,
    directory: Arc<LocationDirectory>,
    policy: MatchPolicy,
    oracle_timeout: Duration,
}

impl std::fmt::Debug for RecordLinkageMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLinkageMatcher")
            .field("policy", &self.policy)
            .field("oracle_timeout", &self.oracle_timeout)
            .finish_non_exhaustive()
    }
}

impl RecordLinkageMatcher {
    /// Create a matcher.
    pub fn new(
        store: Arc<dyn RecordStore>,
        oracle: Arc<dyn BiometricOracle>,
        directory: Arc<LocationDirectory>,
        policy: MatchPolicy,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            directory,
            policy,
            oracle_timeout,
        }
    }

    /// Match a request against known identities.
    ///
    /// Fails only on invalid requests and record-store errors.
    pub async fn find_matches(&self, request: &MatchRequest) -> Result<MatchReport> {
        self.policy.validate(request)?;

        let mut biographic = self.search_biographic(request).await?;

        let isolated_country = if self.policy.country_isolation {
            request.country()
        } else {
            None
        };
        let locations = self.directory.snapshot().await;
        if let Some(country) = isolated_country {
            biographic = isolate_country(biographic, country, &locations);
        }

        let outcome = match request.template() {
            Some(template) => {
                let query = self.policy.biometric_query(true, &biographic);
                self.query_biometric(template, query).await
            }
            None => None,
        };
        let degraded = outcome.as_ref().is_some_and(BiometricOutcome::is_degraded);
        let candidates = outcome
            .as_ref()
            .map(BiometricOutcome::candidates)
            .unwrap_or_default();

        let results = if !biographic.is_empty() {
            let evidence: Vec<MatchCandidate> = biographic
                .iter()
                .map(BiographicHit::candidate)
                .chain(candidates.iter().cloned())
                .collect();
            fan_in(&evidence)
        } else {
            let mut resolved = self.resolve_candidates(candidates).await?;
            if let Some(country) = isolated_country {
                resolved = isolate_country(resolved, country, &locations);
            }
            biometric_only(candidates, &resolved)
        };

        let (results, duplicates) = dedup_results(results);
        if !duplicates.is_empty() {
            tracing::warn!(
                "Dropped {} duplicate identities from match results: {:?}",
                duplicates.len(),
                duplicates
            );
        }

        tracing::debug!(
            biographic = biographic.len(),
            biometric = candidates.len(),
            results = results.len(),
            degraded,
            "match served"
        );

        Ok(MatchReport { results, degraded })
    }

    /// Run phone and external-id searches concurrently and merge them.
    async fn search_biographic(&self, request: &MatchRequest) -> Result<Vec<BiographicHit>> {
        let by_phone = async {
            match request.phone() {
                Some(phone) => self.store.search_by_phone(phone).await,
                None => Ok(Vec::new()),
            }
        };
        let by_external_id = async {
            match request.external_id() {
                Some(id) => self.store.search_by_external_id(id).await,
                None => Ok(Vec::new()),
            }
        };

        let (phone_hits, id_hits) = tokio::join!(by_phone, by_external_id);
        Ok(merge_biographic(phone_hits?, id_hits?))
    }

    /// Ask the matching service, absorbing failures.
    ///
    /// `None` when the service is not consulted at all.
    async fn query_biometric(
        &self,
        template: &Template,
        query: BiometricQuery,
    ) -> Option<BiometricOutcome> {
        let allow = match &query {
            BiometricQuery::Skip => return None,
            BiometricQuery::Global => None,
            BiometricQuery::Restricted(ids) => Some(ids.as_slice()),
        };

        let call = self.oracle.identify(template, allow);
        let result = match tokio::time::timeout(self.oracle_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                let millis = u64::try_from(self.oracle_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(OracleError::Timeout(millis))
            }
        };

        let outcome = BiometricOutcome::from(result);
        if let BiometricOutcome::Degraded { cause } = &outcome {
            tracing::warn!("Biometric matching degraded, continuing without it: {}", cause);
        }
        Some(outcome)
    }

    /// Look up the participant behind each biometric candidate.
    ///
    /// Candidates without an active participant are left out.
    async fn resolve_candidates(
        &self,
        candidates: &[MatchCandidate],
    ) -> Result<Vec<BiographicHit>> {
        let mut resolved = Vec::with_capacity(candidates.len());
        let mut looked_up = HashSet::with_capacity(candidates.len());

        for candidate in candidates {
            if !looked_up.insert(candidate.id) {
                continue;
            }
            if let Some(hit) = self.store.participant(&candidate.id).await? {
                resolved.push(hit);
            }
        }

        Ok(resolved)
    }
}
