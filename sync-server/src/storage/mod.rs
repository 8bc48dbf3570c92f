//! Storage layer for fieldsync-server.
//!
//! The record store is the only durable state in the system. The engines
//! read it through [`RecordStore`]; the only writes are simple upserts used
//! to load the store.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StorageResult;
use async_trait::async_trait;
use sync_core::{BiographicHit, ChangedRow, RecordQuery, VoidSplit};
use sync_types::{Location, LocationId, RecordId};

/// A participant's biographic identity row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParticipant {
    /// Participant identifier.
    pub id: RecordId,
    /// Registration location.
    pub location_id: Option<LocationId>,
    /// External identifier attribute.
    pub external_id: Option<String>,
    /// Phone attribute.
    pub phone: Option<String>,
    /// Voided participants are never returned by searches.
    pub voided: bool,
}

impl StoredParticipant {
    /// The search hit for this participant.
    pub fn to_hit(&self) -> BiographicHit {
        BiographicHit {
            id: self.id,
            location_id: self.location_id.clone(),
            external_id: self.external_id.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Trait for record store backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load the whole location table.
    async fn list_locations(&self) -> StorageResult<Vec<Location>>;

    /// Get rows matching the query, ordered by `(modified_at, id)`.
    ///
    /// Returns at most `limit` rows.
    async fn fetch_changed(
        &self,
        query: &RecordQuery,
        limit: usize,
    ) -> StorageResult<Vec<ChangedRow>>;

    /// Count every row matching the query, split by void flag.
    async fn count(&self, query: &RecordQuery) -> StorageResult<VoidSplit>;

    /// Active participants with this phone number.
    async fn search_by_phone(&self, phone: &str) -> StorageResult<Vec<BiographicHit>>;

    /// Active participants with this external identifier.
    async fn search_by_external_id(
        &self,
        external_id: &str,
    ) -> StorageResult<Vec<BiographicHit>>;

    /// Look up one active participant.
    async fn participant(&self, id: &RecordId) -> StorageResult<Option<BiographicHit>>;

    /// Insert or replace a location.
    async fn upsert_location(&self, location: &Location) -> StorageResult<()>;

    /// Insert or replace a syncable record.
    async fn upsert_record(&self, record: &ChangedRow) -> StorageResult<()>;

    /// Insert or replace a participant's biographic identity.
    async fn upsert_participant(&self, participant: &StoredParticipant) -> StorageResult<()>;
}
