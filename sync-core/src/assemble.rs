//! Sync response assembly.

use fieldsync_types::{CountSummary, DeltaRecord, SyncRequest, SyncResponse, SyncStatus};

/// Combines a delta page and counts into the response envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncResponseAssembler;

impl SyncResponseAssembler {
    /// Build the response for a request.
    ///
    /// The cursor fields of the request are echoed verbatim.
    pub fn assemble(
        &self,
        records: Vec<DeltaRecord>,
        counts: CountSummary,
        request: &SyncRequest,
    ) -> SyncResponse {
        SyncResponse {
            status: status_for(&records),
            records,
            counts,
            since_modified: request.since_modified,
            scope: request.scope.clone(),
            limit: request.limit,
            optimize: request.optimize,
            known_at_cursor: request.known_at_cursor.clone().unwrap_or_default(),
            device_id: request.device_id.clone(),
        }
    }
}

/// `OUT_OF_SYNC` while there is anything to deliver, `OK` otherwise.
pub fn status_for(records: &[DeltaRecord]) -> SyncStatus {
    if records.is_empty() {
        SyncStatus::Ok
    } else {
        SyncStatus::OutOfSync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_types::{
        DeltaOp, DeviceId, LocationScope, RecordId, RecordKind, Timestamp,
    };
    use std::collections::BTreeSet;

    fn request() -> SyncRequest {
        SyncRequest {
            since_modified: Some(Timestamp::from_millis(42)),
            scope: LocationScope::country("Belgium").with_cluster("North"),
            known_at_cursor: Some(BTreeSet::from([RecordId::new()])),
            optimize: true,
            device_id: Some(DeviceId::new("tablet-1")),
            limit: 25,
        }
    }

    fn record() -> DeltaRecord {
        DeltaRecord {
            id: RecordId::new(),
            kind: RecordKind::Participant,
            op: DeltaOp::Update,
            modified_at: Timestamp::from_millis(43),
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn empty_page_is_ok() {
        let response =
            SyncResponseAssembler.assemble(Vec::new(), CountSummary::new(0, 0), &request());
        assert_eq!(response.status, SyncStatus::Ok);
    }

    #[test]
    fn non_empty_page_is_out_of_sync() {
        let response =
            SyncResponseAssembler.assemble(vec![record()], CountSummary::new(1, 0), &request());
        assert_eq!(response.status, SyncStatus::OutOfSync);
        assert_eq!(response.records.len(), 1);
    }

    #[test]
    fn echoes_request_fields() {
        let req = request();
        let response = SyncResponseAssembler.assemble(Vec::new(), CountSummary::new(3, 2), &req);

        assert_eq!(response.since_modified, req.since_modified);
        assert_eq!(response.scope, req.scope);
        assert_eq!(response.limit, 25);
        assert!(response.optimize);
        assert_eq!(Some(response.known_at_cursor), req.known_at_cursor);
        assert_eq!(response.device_id, req.device_id);
        assert_eq!(response.counts.total(), 5);
    }
}
