//! Record-level value types: kinds, delta records, counts and locations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{LocationId, RecordId, SyncError, Timestamp};

/// The logical kinds of record a device keeps a local copy of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Enrolled person
    Participant,
    /// Scheduled or completed visit
    Visit,
    /// Participant photo
    Image,
    /// Biometric template
    Template,
}

impl RecordKind {
    /// Storage name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Visit => "visit",
            Self::Image => "image",
            Self::Template => "template",
        }
    }

    /// Whether records sharing the cursor timestamp are let through and
    /// de-duplicated against `knownAtCursor`, rather than cut off by a strict `>`.
    pub fn includes_cursor_boundary(&self) -> bool {
        matches!(self, Self::Image | Self::Template)
    }

    /// Whether records of this kind carry a device-ownership attribute.
    pub fn has_device_ownership(&self) -> bool {
        matches!(self, Self::Image | Self::Template)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = SyncError;

    /// Accepts both singular and plural spellings (`visit`, `visits`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.strip_suffix('s').unwrap_or(&lower) {
            "participant" => Ok(Self::Participant),
            "visit" => Ok(Self::Visit),
            "image" => Ok(Self::Image),
            "template" => Ok(Self::Template),
            _ => Err(SyncError::Validation(format!(
                "unknown record kind: {}",
                s.trim()
            ))),
        }
    }
}

/// Whether a delta record carries a live record or a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeltaOp {
    /// Record is active; the device should insert or replace it.
    Update,
    /// Record was voided or retired; the device should drop it.
    Delete,
}

impl DeltaOp {
    /// Classify from the record's void/retire flag.
    pub fn from_voided(voided: bool) -> Self {
        if voided {
            Self::Delete
        } else {
            Self::Update
        }
    }
}

/// One changed record returned by a sync call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRecord {
    /// Record identifier
    pub id: RecordId,
    /// Record kind
    pub kind: RecordKind,
    /// Update or Delete
    pub op: DeltaOp,
    /// Store-assigned modification time
    pub modified_at: Timestamp,
    /// Opaque record body
    pub payload: serde_json::Value,
}

/// Full-population counts for one kind within a scope.
///
/// `total` is always `active + voided`: values are built by [`CountSummary::new`]
/// and deserializing rejects a body whose total disagrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CountSummaryWire")]
pub struct CountSummary {
    total: u64,
    active: u64,
    voided: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ignored: Option<u64>,
}

impl CountSummary {
    /// Build a summary from the active/voided split.
    pub fn new(active: u64, voided: u64) -> Self {
        Self {
            total: active + voided,
            active,
            voided,
            ignored: None,
        }
    }

    /// Attach the count of records withheld for device-ownership reasons.
    pub fn with_ignored(mut self, ignored: u64) -> Self {
        self.ignored = Some(ignored);
        self
    }

    /// Active plus voided.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Records not voided.
    pub fn active(&self) -> u64 {
        self.active
    }

    /// Voided or retired records.
    pub fn voided(&self) -> u64 {
        self.voided
    }

    /// Records owned by other devices; `None` unless optimize was requested.
    pub fn ignored(&self) -> Option<u64> {
        self.ignored
    }
}

#[derive(Deserialize)]
struct CountSummaryWire {
    total: u64,
    active: u64,
    voided: u64,
    #[serde(default)]
    ignored: Option<u64>,
}

impl TryFrom<CountSummaryWire> for CountSummary {
    type Error = SyncError;

    fn try_from(wire: CountSummaryWire) -> Result<Self, Self::Error> {
        if wire.active.checked_add(wire.voided) != Some(wire.total) {
            return Err(SyncError::InvalidData(format!(
                "total {} is not active {} + voided {}",
                wire.total, wire.active, wire.voided
            )));
        }
        let summary = Self::new(wire.active, wire.voided);
        Ok(match wire.ignored {
            Some(ignored) => summary.with_ignored(ignored),
            None => summary,
        })
    }
}

/// A location row from the location hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Location identifier
    pub id: LocationId,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Country this location belongs to
    #[serde(default)]
    pub country: Option<String>,
    /// Value of the location's "cluster" attribute
    #[serde(default)]
    pub cluster: Option<String>,
}
