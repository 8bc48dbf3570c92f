//! Mock matching service for testing.
//!
//! Allows scripting candidates, forcing failures and delays, and capturing
//! the allow-lists each call was made with.

use super::{BiometricOracle, OracleError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_types::{MatchCandidate, RecordId, Template};

/// Mock matching service.
#[derive(Debug, Default)]
pub struct MockOracle {
    inner: Arc<Mutex<MockOracleInner>>,
}

#[derive(Debug, Default)]
struct MockOracleInner {
    candidates: Vec<MatchCandidate>,
    calls: Vec<Option<Vec<RecordId>>>,
    fail_next: Option<OracleError>,
    delay: Option<Duration>,
}

impl MockOracle {
    /// Create a mock that returns no candidates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this candidate from every call (subject to the allow-list).
    pub fn add_hit(&self, id: RecordId, score: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.candidates.push(MatchCandidate::biometric(id, score));
    }

    /// Cause the next identify() to fail with the given error.
    pub fn fail_next(&self, error: OracleError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next = Some(error);
    }

    /// Sleep this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.delay = Some(delay);
    }

    /// Allow-lists of every call so far (`None` for global searches).
    pub fn calls(&self) -> Vec<Option<Vec<RecordId>>> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }
}

impl Clone for MockOracle {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl BiometricOracle for MockOracle {
    async fn identify(
        &self,
        _template: &Template,
        allow_list: Option<&[RecordId]>,
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(allow_list.map(<[RecordId]>::to_vec));
            inner.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next.take() {
            return Err(error);
        }

        Ok(inner
            .candidates
            .iter()
            .filter(|c| allow_list.map_or(true, |allow| allow.contains(&c.id)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Template {
        Template::new(vec![7; 8])
    }

    #[tokio::test]
    async fn returns_scripted_hits() {
        let oracle = MockOracle::new();
        let id = RecordId::new();
        oracle.add_hit(id, 42);

        let hits = oracle.identify(&template(), None).await.unwrap();
        assert_eq!(hits, vec![MatchCandidate::biometric(id, 42)]);
        assert_eq!(oracle.calls(), vec![None]);
    }

    #[tokio::test]
    async fn allow_list_restricts_hits() {
        let oracle = MockOracle::new();
        let allowed = RecordId::new();
        oracle.add_hit(allowed, 10);
        oracle.add_hit(RecordId::new(), 90);

        let hits = oracle.identify(&template(), Some(&[allowed])).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(oracle.calls(), vec![Some(vec![allowed])]);
    }

    #[tokio::test]
    async fn fail_next_fails_once() {
        let oracle = MockOracle::new();
        oracle.fail_next(OracleError::RequestFailed("boom".into()));

        assert!(oracle.identify(&template(), None).await.is_err());
        assert!(oracle.identify(&template(), None).await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let oracle = MockOracle::new();
        let clone = oracle.clone();
        clone.identify(&template(), None).await.unwrap();
        assert_eq!(oracle.calls().len(), 1);
    }
}
