//! HTTP client for an external matching service.
//!
//! Wire format:
//!
//! ```text
//! POST {base}/identify
//! { "template": "<base64>", "allowList": ["<uuid>", ...] }   // allowList omitted for global search
//!
//! 200 OK
//! { "matches": [ { "id": "<uuid>", "score": 87 }, ... ] }
//! ```

use super::{BiometricOracle, OracleError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sync_types::{MatchCandidate, RecordId, Template};

/// Matching service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    identify_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyRequest<'a> {
    template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_list: Option<&'a [RecordId]>,
}

#[derive(Deserialize)]
struct IdentifyResponse {
    #[serde(default)]
    matches: Vec<IdentifyMatch>,
}

#[derive(Deserialize)]
struct IdentifyMatch {
    id: RecordId,
    score: i64,
}

impl HttpOracle {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            identify_url: identify_url(base_url),
        }
    }

    /// The URL identify calls are posted to.
    pub fn identify_url(&self) -> &str {
        &self.identify_url
    }
}

fn identify_url(base_url: &str) -> String {
    format!("{}/identify", base_url.trim().trim_end_matches('/'))
}

#[async_trait]
impl BiometricOracle for HttpOracle {
    async fn identify(
        &self,
        template: &Template,
        allow_list: Option<&[RecordId]>,
    ) -> Result<Vec<MatchCandidate>, OracleError> {
        let request = IdentifyRequest {
            template: template.to_base64(),
            allow_list,
        };

        let response = self
            .client
            .post(&self.identify_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IdentifyResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| MatchCandidate::biometric(m.id, m.score))
            .collect())
    }
}
