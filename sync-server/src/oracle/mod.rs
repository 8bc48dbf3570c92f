//! Biometric matching service abstraction.
//!
//! The matching service is a black box: given a fingerprint template and an
//! optional allow-list of identities, it returns ranked candidates. It can
//! fail or stall independently of the server, so callers never see its
//! errors directly; [`RecordLinkageMatcher`](crate::matcher::RecordLinkageMatcher)
//! turns every call into a [`BiometricOutcome`].
//!
//! # Implementations
//!
//! - [`HttpOracle`] calls a matching service over HTTP
//! - [`UnavailableOracle`] is used when no service is configured
//! - `MockOracle` (tests only) scripts hits, failures and delays

mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpOracle;
#[cfg(test)]
pub use mock::MockOracle;

use async_trait::async_trait;
use sync_types::{MatchCandidate, RecordId, Template};
use thiserror::Error;

/// Matching service errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// No matching service is configured.
    #[error("biometric matching service not configured")]
    Unavailable,

    /// The request could not be delivered.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The service answered with a non-success status.
    #[error("matching service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for logs.
        body: String,
    },

    /// The service answered with something unreadable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within the configured timeout.
    #[error("matching service timed out after {0} ms")]
    Timeout(u64),
}

/// A ranked-match service for fingerprint templates.
#[async_trait]
pub trait BiometricOracle: Send + Sync {
    /// Identify a template.
    ///
    /// With `allow_list`, only those identities are considered; without it the
    /// search is global.
    async fn identify(
        &self,
        template: &Template,
        allow_list: Option<&[RecordId]>,
    ) -> Result<Vec<MatchCandidate>, OracleError>;
}

/// Result of one biometric step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    /// The service answered (possibly with no candidates).
    Matched(Vec<MatchCandidate>),
    /// The service failed; the biometric result counts as empty.
    Degraded {
        /// What went wrong.
        cause: OracleError,
    },
}

impl BiometricOutcome {
    /// Candidates to fan in; empty when degraded.
    pub fn candidates(&self) -> &[MatchCandidate] {
        match self {
            Self::Matched(candidates) => candidates,
            Self::Degraded { .. } => &[],
        }
    }

    /// Whether the service failed.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

impl From<Result<Vec<MatchCandidate>, OracleError>> for BiometricOutcome {
    fn from(result: Result<Vec<MatchCandidate>, OracleError>) -> Self {
        match result {
            Ok(candidates) => Self::Matched(candidates),
            Err(cause) => Self::Degraded { cause },
        }
    }
}

/// Oracle used when no matching service is configured.
///
/// Every call fails, so the biometric path always degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl BiometricOracle for UnavailableOracle {
    async fn identify(
        &self,
        _template: &Template,
        _allow_list: Option<&[RecordId]>,
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        Err(OracleError::Unavailable)
    }
}
