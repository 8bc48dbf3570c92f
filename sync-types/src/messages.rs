//! Request and response shapes of the sync and match operations.
//!
//! Field names follow the camelCase JSON the field devices already speak.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::{CountSummary, DeltaRecord, DeviceId, RecordId, SyncError, Timestamp};

/// Country / cluster / site restriction of a request.
///
/// A precedence chain, not a set: a non-blank `site` wins over `cluster`,
/// which wins over `country`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationScope {
    /// Country name
    #[serde(default)]
    pub country: Option<String>,
    /// Cluster attribute value
    #[serde(default)]
    pub cluster: Option<String>,
    /// Site (location) identifier
    #[serde(default)]
    pub site: Option<String>,
}

impl LocationScope {
    /// Scope covering a whole country.
    pub fn country(country: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
            ..Self::default()
        }
    }

    /// Narrow the scope to a cluster.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Narrow the scope to a single site.
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }
}

/// A device's request for the next page of changes of one record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Modification time the device is synced up to (absent = from scratch)
    #[serde(default)]
    pub since_modified: Option<Timestamp>,
    /// Location restriction
    #[serde(default)]
    pub scope: LocationScope,
    /// Ids the device already holds at exactly `since_modified`; mandatory, may be empty
    #[serde(default)]
    pub known_at_cursor: Option<BTreeSet<RecordId>>,
    /// Withhold records owned by other devices and report them as `ignored`
    #[serde(default)]
    pub optimize: bool,
    /// Requesting device, required when `optimize` is set
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Maximum number of new records wanted
    #[serde(default)]
    pub limit: i64,
}

/// Whether the device still has changes to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Nothing new for this device
    Ok,
    /// The response carries changes; the device should poll again
    OutOfSync,
}

/// Response envelope of a sync call.
///
/// Echoes the cursor fields of the request so the device can correlate
/// the page with what it asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Derived sync status
    pub status: SyncStatus,
    /// Changed records, ordered by modification time
    pub records: Vec<DeltaRecord>,
    /// Full-population counts for the scope
    #[serde(flatten)]
    pub counts: CountSummary,
    /// Echo of the request's `sinceModified`
    #[serde(default)]
    pub since_modified: Option<Timestamp>,
    /// Echo of the request's scope
    pub scope: LocationScope,
    /// Echo of the request's limit
    pub limit: i64,
    /// Echo of the request's optimize flag
    pub optimize: bool,
    /// Echo of the request's known ids
    pub known_at_cursor: BTreeSet<RecordId>,
    /// Echo of the requesting device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

/// Raw biometric template bytes, carried as base64 on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Template(Vec<u8>);

impl Template {
    /// Wrap raw template bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decode a base64 template.
    pub fn from_base64(encoded: &str) -> Result<Self, SyncError> {
        STANDARD
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| SyncError::InvalidData(format!("template is not valid base64: {e}")))
    }

    /// Encode as base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when no bytes were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({} bytes)", self.0.len())
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Template::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Partial identity evidence gathered by a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    /// Phone number
    #[serde(default)]
    pub phone: Option<String>,
    /// External (participant) identifier
    #[serde(default)]
    pub external_id: Option<String>,
    /// Biometric template
    #[serde(default)]
    pub template: Option<Template>,
    /// Country of the requesting device
    #[serde(default)]
    pub country: Option<String>,
}

impl MatchRequest {
    /// Non-blank phone, if any.
    pub fn phone(&self) -> Option<&str> {
        non_blank(self.phone.as_deref())
    }

    /// Non-blank external id, if any.
    pub fn external_id(&self) -> Option<&str> {
        non_blank(self.external_id.as_deref())
    }

    /// Non-empty template, if any.
    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref().filter(|t| !t.is_empty())
    }

    /// Non-blank country, if any.
    pub fn country(&self) -> Option<&str> {
        non_blank(self.country.as_deref())
    }

    /// True when at least one of phone, external id or template is present.
    pub fn has_search_key(&self) -> bool {
        self.phone().is_some() || self.external_id().is_some() || self.template().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Where a match candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateSource {
    /// Record-store search (phone or external id)
    Biographic,
    /// Biometric matching service
    Biometric,
}

/// One candidate identity from a single search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    /// Participant identifier
    pub id: RecordId,
    /// Matcher score, biometric candidates only
    #[serde(default)]
    pub score: Option<i64>,
    /// Search that produced this candidate
    pub source: CandidateSource,
}

impl MatchCandidate {
    /// Candidate from a record-store search.
    pub fn biographic(id: RecordId) -> Self {
        Self {
            id,
            score: None,
            source: CandidateSource::Biographic,
        }
    }

    /// Candidate from the biometric matcher.
    pub fn biometric(id: RecordId, score: i64) -> Self {
        Self {
            id,
            score: Some(score),
            source: CandidateSource::Biometric,
        }
    }
}

/// Whether a resolved identity was corroborated by biometrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Found in the record store only
    OpenmrsOnly,
    /// Found in the record store and by the biometric matcher
    Both,
}

/// One resolved identity in a match response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Participant identifier
    pub id: RecordId,
    /// Evidence behind this result
    pub provenance: Provenance,
    /// Biometric score, 0 when not corroborated
    pub score: i64,
}
