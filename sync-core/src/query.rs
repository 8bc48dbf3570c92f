//! The shared record predicate.
//!
//! Delta fetching and population counting describe the rows they want with
//! the same [`RecordQuery`]. Storage backends render one predicate for both,
//! so the counts and the pages they accompany can never disagree about what
//! "in scope" means.

use std::collections::BTreeSet;

use fieldsync_types::{DeviceId, LocationId, RecordKind, Timestamp};

use crate::cursor::SyncCursor;
use crate::delta::ChangedRow;

/// Lower bound on modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    /// Every row, regardless of modification time.
    Unbounded,
    /// Rows modified strictly after the timestamp.
    After(Timestamp),
    /// Rows modified at or after the timestamp.
    AtOrAfter(Timestamp),
}

impl TimeBound {
    /// The bound a cursor implies for a kind.
    ///
    /// Image and template rows sharing the cursor timestamp are let through
    /// and later de-duplicated against the known set. Other kinds use a
    /// strict bound, unless the device lists ids it holds at the cursor:
    /// it is then resuming a timestamp group larger than one page.
    pub fn for_cursor(kind: RecordKind, cursor: &SyncCursor) -> Self {
        match cursor.since_modified() {
            None => Self::Unbounded,
            Some(ts) if kind.includes_cursor_boundary() => Self::AtOrAfter(ts),
            Some(ts) if !cursor.known_at_cursor().is_empty() => Self::AtOrAfter(ts),
            Some(ts) => Self::After(ts),
        }
    }

    /// Whether a modification time satisfies the bound.
    pub fn admits(&self, modified_at: Timestamp) -> bool {
        match self {
            Self::Unbounded => true,
            Self::After(ts) => modified_at > *ts,
            Self::AtOrAfter(ts) => modified_at >= *ts,
        }
    }
}

/// Device-ownership restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// No restriction.
    Any,
    /// Rows without an owner or owned by this device.
    DeliverableTo(DeviceId),
    /// Rows owned by some other device.
    ForeignTo(DeviceId),
}

impl Ownership {
    /// Whether a row with this owner satisfies the restriction.
    pub fn admits(&self, owner: Option<&DeviceId>) -> bool {
        match self {
            Self::Any => true,
            Self::DeliverableTo(device) => owner.map_or(true, |o| o == device),
            Self::ForeignTo(device) => owner.is_some_and(|o| o != device),
        }
    }
}

/// Scope, time bound and ownership of a set of rows of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Record kind.
    pub kind: RecordKind,
    /// Locations in scope.
    pub location_ids: BTreeSet<LocationId>,
    /// Modification-time bound.
    pub time: TimeBound,
    /// Device-ownership restriction.
    pub ownership: Ownership,
}

impl RecordQuery {
    /// Every row of `kind` within the locations.
    pub fn population(kind: RecordKind, location_ids: BTreeSet<LocationId>) -> Self {
        Self {
            kind,
            location_ids,
            time: TimeBound::Unbounded,
            ownership: Ownership::Any,
        }
    }

    /// Rows a device should receive after its cursor.
    ///
    /// With `optimize` and a kind that tracks ownership, rows owned by other
    /// devices are left out.
    pub fn delta(
        kind: RecordKind,
        location_ids: BTreeSet<LocationId>,
        cursor: &SyncCursor,
        optimize_for: Option<&DeviceId>,
    ) -> Self {
        let ownership = match optimize_for {
            Some(device) if kind.has_device_ownership() => Ownership::DeliverableTo(device.clone()),
            _ => Ownership::Any,
        };
        Self {
            kind,
            location_ids,
            time: TimeBound::for_cursor(kind, cursor),
            ownership,
        }
    }

    /// The same scope with no time bound and no ownership restriction.
    pub fn whole_population(&self) -> Self {
        Self::population(self.kind, self.location_ids.clone())
    }

    /// The population rows a device never receives because another device owns them.
    ///
    /// `None` when the kind has no ownership attribute.
    pub fn foreign_population(&self, device: &DeviceId) -> Option<Self> {
        if !self.kind.has_device_ownership() {
            return None;
        }
        Some(Self {
            ownership: Ownership::ForeignTo(device.clone()),
            ..self.whole_population()
        })
    }

    /// Evaluate the predicate against a row.
    pub fn matches(&self, row: &ChangedRow) -> bool {
        row.kind == self.kind
            && self.location_ids.contains(&row.location_id)
            && self.time.admits(row.modified_at)
            && self.ownership.admits(row.owner_device.as_ref())
    }
}
