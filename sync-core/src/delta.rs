//! Delta reconciliation.
//!
//! Turns the rows a store returned for a [`RecordQuery`](crate::RecordQuery)
//! into the page a device receives: each row is classified Update or Delete,
//! rows the device already holds at the cursor are dropped, a row id never
//! appears twice, and the page is cut to the cursor's limit.
//!
//! Kinds with a strict `modified_at > since` bound cannot resume inside a
//! timestamp group: the next call starts after the group's timestamp. A page
//! of such a kind therefore never ends part-way through a group unless the
//! group fills the whole page.

use std::collections::HashSet;

use fieldsync_types::{
    DeltaOp, DeltaRecord, DeviceId, LocationId, RecordId, RecordKind, Timestamp,
};

use crate::cursor::SyncCursor;

/// A row as stored, with the attributes the sync engine filters on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedRow {
    /// Record identifier.
    pub id: RecordId,
    /// Record kind.
    pub kind: RecordKind,
    /// Location the record belongs to.
    pub location_id: LocationId,
    /// Store-assigned modification time.
    pub modified_at: Timestamp,
    /// Void / retire flag.
    pub voided: bool,
    /// Device that owns the record, for kinds that track ownership.
    pub owner_device: Option<DeviceId>,
    /// Opaque record body.
    pub payload: serde_json::Value,
}

impl ChangedRow {
    /// Convert into the record delivered to devices.
    pub fn into_delta(self) -> DeltaRecord {
        DeltaRecord {
            id: self.id,
            kind: self.kind,
            op: DeltaOp::from_voided(self.voided),
            modified_at: self.modified_at,
            payload: self.payload,
        }
    }
}

/// The reconciled page plus bookkeeping for logs and metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaPage {
    /// Records to deliver, in store order.
    pub records: Vec<DeltaRecord>,
    /// Rows dropped because the device already holds them at the cursor.
    pub skipped_known: usize,
    /// Ids seen more than once; a data error in the store.
    pub duplicates: Vec<RecordId>,
    /// Trailing rows held back so the page ends on a timestamp boundary.
    pub held_back: usize,
    /// The page is one timestamp group larger than the limit.
    pub split_group: bool,
}

/// Reconcile fetched rows against a cursor.
///
/// `rows` must be ordered by `(modified_at, id)`. A row beyond the full page
/// is never delivered; it only shows where the next page starts (see
/// [`SyncCursor::fetch_limit`]).
pub fn reconcile(rows: Vec<ChangedRow>, cursor: &SyncCursor) -> DeltaPage {
    let mut page = DeltaPage::default();
    let mut seen: HashSet<(RecordKind, RecordId)> = HashSet::with_capacity(rows.len());
    let mut next_at = None;

    for row in rows {
        if cursor.is_known(&row.id, row.modified_at) {
            page.skipped_known += 1;
            continue;
        }
        if !seen.insert((row.kind, row.id)) {
            page.duplicates.push(row.id);
            continue;
        }
        if page.records.len() >= cursor.limit() {
            next_at = Some(row.modified_at);
            break;
        }
        page.records.push(row.into_delta());
    }

    if let Some(next_at) = next_at {
        page.end_on_group_boundary(next_at);
    }
    page
}

impl DeltaPage {
    fn end_on_group_boundary(&mut self, next_at: Timestamp) {
        let Some(last) = self.records.last() else {
            return;
        };
        if last.kind.includes_cursor_boundary() || last.modified_at != next_at {
            return;
        }

        let group = self
            .records
            .iter()
            .rev()
            .take_while(|r| r.modified_at == next_at)
            .count();
        if group == self.records.len() {
            self.split_group = true;
            return;
        }
        self.records.truncate(self.records.len() - group);
        self.held_back = group;
    }
}
