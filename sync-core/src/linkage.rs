//! Record-linkage steps.
//!
//! Pure pieces of identity matching: merging biographic search results,
//! the country-isolation gate, deciding how the biometric matcher is
//! queried, and fanning biographic and biometric evidence into one
//! provenance-tagged result list. The actual searches and matcher calls are
//! performed by the server, which feeds their results through these
//! functions in order.

use std::collections::{HashMap, HashSet};

use fieldsync_types::{
    CandidateSource, LocationId, MatchCandidate, MatchRequest, MatchResult, Provenance, RecordId,
    SyncError,
};

use crate::scope::LocationIndex;

/// Errors that reject a match request outright.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkageError {
    /// None of phone, external id or template was supplied.
    #[error("at least one of phone, externalId or template is required")]
    NoSearchKey,

    /// Country isolation is on but the request names no country.
    #[error("country is required when cross-country matching is disabled")]
    MissingCountry,
}

impl From<LinkageError> for SyncError {
    fn from(err: LinkageError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

/// A participant found in the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiographicHit {
    /// Participant identifier.
    pub id: RecordId,
    /// Location the participant is registered at.
    pub location_id: Option<LocationId>,
    /// External identifier attribute.
    pub external_id: Option<String>,
    /// Phone attribute.
    pub phone: Option<String>,
}

impl BiographicHit {
    /// The candidate this hit represents.
    pub fn candidate(&self) -> MatchCandidate {
        MatchCandidate::biographic(self.id)
    }
}

/// Matching policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Restrict biometric search to identities found biographically.
    pub mfa_enabled: bool,
    /// Only match identities registered in the requesting country.
    pub country_isolation: bool,
}

/// How the biometric matcher should be queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricQuery {
    /// Do not call the matcher; the biometric result is empty.
    Skip,
    /// Search every enrolled template.
    Global,
    /// Search only these identities.
    Restricted(Vec<RecordId>),
}

impl MatchPolicy {
    /// Reject requests the matcher cannot serve.
    pub fn validate(&self, request: &MatchRequest) -> Result<(), LinkageError> {
        if !request.has_search_key() {
            return Err(LinkageError::NoSearchKey);
        }
        if self.country_isolation && request.country().is_none() {
            return Err(LinkageError::MissingCountry);
        }
        Ok(())
    }

    /// Decide the biometric query for a request, given the surviving biographic hits.
    ///
    /// Under MFA an empty allow-list means there is nothing to corroborate,
    /// so the matcher is not called at all.
    pub fn biometric_query(
        &self,
        has_template: bool,
        biographic: &[BiographicHit],
    ) -> BiometricQuery {
        if !has_template {
            return BiometricQuery::Skip;
        }
        if !self.mfa_enabled {
            return BiometricQuery::Global;
        }
        let allow = allow_list(biographic);
        if allow.is_empty() {
            BiometricQuery::Skip
        } else {
            BiometricQuery::Restricted(allow)
        }
    }
}

/// Merge phone-search and id-search hits by id, first occurrence wins.
pub fn merge_biographic(
    phone_hits: Vec<BiographicHit>,
    id_hits: Vec<BiographicHit>,
) -> Vec<BiographicHit> {
    let mut seen = HashSet::new();
    phone_hits
        .into_iter()
        .chain(id_hits)
        .filter(|hit| seen.insert(hit.id))
        .collect()
}

/// Keep only hits registered at a location of `country`.
///
/// Hits whose location or country is unknown are dropped as well.
pub fn isolate_country(
    hits: Vec<BiographicHit>,
    country: &str,
    locations: &LocationIndex,
) -> Vec<BiographicHit> {
    let country = country.trim();
    hits.into_iter()
        .filter(|hit| {
            hit.location_id
                .as_ref()
                .and_then(|l| locations.country_of(l))
                .is_some_and(|c| c == country)
        })
        .collect()
}

/// Ids of the biographic hits, in order.
pub fn allow_list(hits: &[BiographicHit]) -> Vec<RecordId> {
    hits.iter().map(|h| h.id).collect()
}

/// Fan biographic and biometric candidates into results.
///
/// Each biographic candidate yields one result, in order: `Both` with the
/// biometric score when the matcher also returned it, `OpenmrsOnly` with
/// score 0 otherwise. Biometric candidates only contribute scores.
pub fn fan_in(evidence: &[MatchCandidate]) -> Vec<MatchResult> {
    let scores = biometric_scores(evidence);
    evidence
        .iter()
        .filter(|c| c.source == CandidateSource::Biographic)
        .map(|c| match scores.get(&c.id) {
            Some(score) => MatchResult {
                id: c.id,
                provenance: Provenance::Both,
                score: *score,
            },
            None => MatchResult {
                id: c.id,
                provenance: Provenance::OpenmrsOnly,
                score: 0,
            },
        })
        .collect()
}

/// Results of a pure-biometric search.
///
/// Candidates without a corresponding record in `resolved` are dropped;
/// the rest are `Both` with the matcher's score.
pub fn biometric_only(
    biometric: &[MatchCandidate],
    resolved: &[BiographicHit],
) -> Vec<MatchResult> {
    let known: HashSet<RecordId> = resolved.iter().map(|h| h.id).collect();
    biometric
        .iter()
        .filter(|c| known.contains(&c.id))
        .map(|c| MatchResult {
            id: c.id,
            provenance: Provenance::Both,
            score: c.score.unwrap_or(0),
        })
        .collect()
}

/// Drop repeated ids, keeping the first. Returns the results and the dropped ids.
pub fn dedup_results(results: Vec<MatchResult>) -> (Vec<MatchResult>, Vec<RecordId>) {
    let mut seen = HashSet::with_capacity(results.len());
    let mut duplicates = Vec::new();
    let mut unique = Vec::with_capacity(results.len());

    for result in results {
        if seen.insert(result.id) {
            unique.push(result);
        } else {
            duplicates.push(result.id);
        }
    }

    (unique, duplicates)
}

fn biometric_scores(evidence: &[MatchCandidate]) -> HashMap<RecordId, i64> {
    let mut scores = HashMap::new();
    for candidate in evidence
        .iter()
        .filter(|c| c.source == CandidateSource::Biometric)
    {
        scores
            .entry(candidate.id)
            .or_insert(candidate.score.unwrap_or(0));
    }
    scores
}
