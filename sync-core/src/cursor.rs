//! Sync cursor for timestamp-ordered deltas.
//!
//! Modification times are not unique: many records can share one timestamp.
//! A cursor therefore pairs the last timestamp a device has reached with the
//! set of record ids it already holds *at exactly* that timestamp. A row is
//! skipped only when both its id and its timestamp match; neither alone is
//! enough.

use std::collections::BTreeSet;

use fieldsync_types::{DeviceId, RecordId, SyncError, SyncRequest, Timestamp};

/// Errors produced when a request's cursor fields are unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    /// Limit was zero or negative.
    #[error("limit must be positive, got {0}")]
    NonPositiveLimit(i64),

    /// `knownAtCursor` was absent (it is mandatory, even when empty).
    #[error("knownAtCursor is required")]
    MissingKnownSet,

    /// `optimize` was requested without saying which device is asking.
    #[error("optimize requires a deviceId")]
    OptimizeWithoutDevice,
}

impl From<CursorError> for SyncError {
    fn from(err: CursorError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

/// A validated `(sinceModified, knownAtCursor, limit)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    since_modified: Option<Timestamp>,
    known_at_cursor: BTreeSet<RecordId>,
    limit: usize,
}

impl SyncCursor {
    /// Create a cursor directly.
    pub fn new(
        since_modified: Option<Timestamp>,
        known_at_cursor: BTreeSet<RecordId>,
        limit: usize,
    ) -> Self {
        Self {
            since_modified,
            known_at_cursor,
            limit,
        }
    }

    /// Validate the cursor fields of a request.
    ///
    /// The requested limit is clamped to `max_limit`; the request itself is
    /// left untouched so the response can still echo it.
    pub fn from_request(request: &SyncRequest, max_limit: usize) -> Result<Self, CursorError> {
        if request.limit <= 0 {
            return Err(CursorError::NonPositiveLimit(request.limit));
        }
        let known = request
            .known_at_cursor
            .clone()
            .ok_or(CursorError::MissingKnownSet)?;
        if request.optimize && requesting_device(request).is_none() {
            return Err(CursorError::OptimizeWithoutDevice);
        }

        let limit = usize::try_from(request.limit)
            .unwrap_or(usize::MAX)
            .min(max_limit.max(1));

        Ok(Self::new(request.since_modified, known, limit))
    }

    /// Timestamp the device has reached, if any.
    pub fn since_modified(&self) -> Option<Timestamp> {
        self.since_modified
    }

    /// Ids the device holds at exactly `since_modified`.
    pub fn known_at_cursor(&self) -> &BTreeSet<RecordId> {
        &self.known_at_cursor
    }

    /// Maximum number of records to deliver.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Rows to fetch from the store.
    ///
    /// Over-fetches by the size of the known set so that, after known rows
    /// are dropped, a full page of new rows can still be delivered, plus one
    /// row showing where the following page starts.
    pub fn fetch_limit(&self) -> usize {
        self.limit
            .saturating_add(self.known_at_cursor.len())
            .saturating_add(1)
    }

    /// Whether the device already holds this exact `(id, modifiedAt)` pair.
    pub fn is_known(&self, id: &RecordId, modified_at: Timestamp) -> bool {
        self.since_modified == Some(modified_at) && self.known_at_cursor.contains(id)
    }
}

/// The device id of a request, ignoring blank values.
pub fn requesting_device(request: &SyncRequest) -> Option<&DeviceId> {
    request
        .device_id
        .as_ref()
        .filter(|d| !d.as_str().trim().is_empty())
}
