//! SQLite storage backend for fieldsync-server.

use super::{RecordStore, StoredParticipant};
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use sync_core::{BiographicHit, ChangedRow, Ownership, RecordQuery, TimeBound, VoidSplit};
use sync_types::{DeviceId, Location, LocationId, RecordId, RecordKind, Timestamp};

const RECORD_COLUMNS: &str =
    "SELECT id, kind, location_id, modified_at, voided, owner_device, payload FROM records";

const PARTICIPANT_COLUMNS: &str = "SELECT id, location_id, external_id, phone FROM participants";

/// SQLite-based record store.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl SqliteStore {
    /// Open a SQLite store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let url = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;
        let options = SqliteConnectOptions::from_str(url)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id TEXT PRIMARY KEY,
                name TEXT,
                country TEXT,
                cluster TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                location_id TEXT NOT NULL,
                modified_at INTEGER NOT NULL,
                voided INTEGER NOT NULL DEFAULT 0,
                owner_device TEXT,
                payload TEXT NOT NULL DEFAULT 'null',
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS participants (
                id TEXT PRIMARY KEY,
                location_id TEXT,
                external_id TEXT,
                phone TEXT,
                voided INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_scope ON records(kind, location_id, modified_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_participants_phone ON participants(phone)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_participants_external_id ON participants(external_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search_participants(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Vec<BiographicHit>, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new(PARTICIPANT_COLUMNS);
        builder
            .push(" WHERE voided = 0 AND ")
            .push(column)
            .push(" = ")
            .push_bind(value.trim())
            .push(" ORDER BY id ASC");

        let rows: Vec<ParticipantRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(BiographicHit::try_from).collect()
    }
}

/// Render the WHERE clause of a [`RecordQuery`].
///
/// Shared by fetching and counting so both see exactly the same rows.
fn push_predicate<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a RecordQuery) {
    builder.push(" WHERE kind = ").push_bind(query.kind.as_str());

    if query.location_ids.is_empty() {
        builder.push(" AND 0");
    } else {
        builder.push(" AND location_id IN (");
        let mut ids = builder.separated(", ");
        for id in &query.location_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");
    }

    match query.time {
        TimeBound::Unbounded => {}
        TimeBound::After(ts) => {
            builder.push(" AND modified_at > ").push_bind(ts.millis());
        }
        TimeBound::AtOrAfter(ts) => {
            builder.push(" AND modified_at >= ").push_bind(ts.millis());
        }
    }

    match &query.ownership {
        Ownership::Any => {}
        Ownership::DeliverableTo(device) => {
            builder
                .push(" AND (owner_device IS NULL OR owner_device = ")
                .push_bind(device.as_str())
                .push(")");
        }
        Ownership::ForeignTo(device) => {
            builder
                .push(" AND owner_device IS NOT NULL AND owner_device <> ")
                .push_bind(device.as_str());
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_locations(&self) -> Result<Vec<Location>, StorageError> {
        let rows = sqlx::query_as::<_, LocationRow>(
            "SELECT id, name, country, cluster FROM locations ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Location::from).collect())
    }

    async fn fetch_changed(
        &self,
        query: &RecordQuery,
        limit: usize,
    ) -> Result<Vec<ChangedRow>, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new(RECORD_COLUMNS);
        push_predicate(&mut builder, query);
        builder
            .push(" ORDER BY modified_at ASC, id ASC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ChangedRow::try_from).collect()
    }

    async fn count(&self, query: &RecordQuery) -> Result<VoidSplit, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN voided = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN voided <> 0 THEN 1 ELSE 0 END), 0)
            FROM records"#,
        );
        push_predicate(&mut builder, query);

        let (active, voided): (i64, i64) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(VoidSplit {
            active: active.max(0) as u64,
            voided: voided.max(0) as u64,
        })
    }

    async fn search_by_phone(&self, phone: &str) -> Result<Vec<BiographicHit>, StorageError> {
        self.search_participants("phone", phone).await
    }

    async fn search_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<BiographicHit>, StorageError> {
        self.search_participants("external_id", external_id).await
    }

    async fn participant(&self, id: &RecordId) -> Result<Option<BiographicHit>, StorageError> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT id, location_id, external_id, phone
            FROM participants
            WHERE id = ?1 AND voided = 0
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BiographicHit::try_from).transpose()
    }

    async fn upsert_location(&self, location: &Location) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, name, country, cluster)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                country = excluded.country,
                cluster = excluded.cluster
            "#,
        )
        .bind(location.id.as_str())
        .bind(location.name.as_deref())
        .bind(location.country.as_deref())
        .bind(location.cluster.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_record(&self, record: &ChangedRow) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&record.payload)?;

        sqlx::query(
            r#"
            INSERT INTO records (kind, id, location_id, modified_at, voided, owner_device, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(kind, id) DO UPDATE SET
                location_id = excluded.location_id,
                modified_at = excluded.modified_at,
                voided = excluded.voided,
                owner_device = excluded.owner_device,
                payload = excluded.payload
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.id.to_string())
        .bind(record.location_id.as_str())
        .bind(record.modified_at.millis())
        .bind(record.voided)
        .bind(record.owner_device.as_ref().map(DeviceId::as_str))
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_participant(
        &self,
        participant: &StoredParticipant,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO participants (id, location_id, external_id, phone, voided)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                location_id = excluded.location_id,
                external_id = excluded.external_id,
                phone = excluded.phone,
                voided = excluded.voided
            "#,
        )
        .bind(participant.id.to_string())
        .bind(participant.location_id.as_ref().map(LocationId::as_str))
        .bind(participant.external_id.as_deref())
        .bind(participant.phone.as_deref())
        .bind(participant.voided)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Internal row type for location queries.
#[derive(sqlx::FromRow)]
struct LocationRow {
    id: String,
    name: Option<String>,
    country: Option<String>,
    cluster: Option<String>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Location {
            id: LocationId::new(row.id),
            name: row.name,
            country: row.country,
            cluster: row.cluster,
        }
    }
}

/// Internal row type for record queries.
#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    kind: String,
    location_id: String,
    modified_at: i64,
    voided: bool,
    owner_device: Option<String>,
    payload: String,
}

impl TryFrom<RecordRow> for ChangedRow {
    type Error = StorageError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let id = parse_id(&row.id)?;
        let kind: RecordKind = row.kind.parse().map_err(|e: sync_types::SyncError| {
            StorageError::Corrupt {
                column: "kind",
                row: row.id.clone(),
                reason: e.to_string(),
            }
        })?;
        let payload = serde_json::from_str(&row.payload).map_err(|e| StorageError::Corrupt {
            column: "payload",
            row: row.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(ChangedRow {
            id,
            kind,
            location_id: LocationId::new(row.location_id),
            modified_at: Timestamp::from_millis(row.modified_at),
            voided: row.voided,
            owner_device: row.owner_device.map(DeviceId::new),
            payload,
        })
    }
}

/// Internal row type for participant queries.
#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: String,
    location_id: Option<String>,
    external_id: Option<String>,
    phone: Option<String>,
}

impl TryFrom<ParticipantRow> for BiographicHit {
    type Error = StorageError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(BiographicHit {
            id: parse_id(&row.id)?,
            location_id: row.location_id.map(LocationId::new),
            external_id: row.external_id,
            phone: row.phone,
        })
    }
}

fn parse_id(raw: &str) -> Result<RecordId, StorageError> {
    raw.parse::<RecordId>().map_err(|e| StorageError::Corrupt {
        column: "id",
        row: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use sync_core::SyncCursor;

    fn record(kind: RecordKind, location: &str, at: i64, voided: bool) -> ChangedRow {
        ChangedRow {
            id: RecordId::new(),
            kind,
            location_id: LocationId::new(location),
            modified_at: Timestamp::from_millis(at),
            voided,
            owner_device: None,
            payload: serde_json::json!({ "at": at }),
        }
    }

    fn scope(ids: &[&str]) -> BTreeSet<LocationId> {
        ids.iter().map(|id| LocationId::new(*id)).collect()
    }

    fn participant(location: &str, phone: &str, external_id: &str) -> StoredParticipant {
        StoredParticipant {
            id: RecordId::new(),
            location_id: Some(LocationId::new(location)),
            external_id: Some(external_id.to_string()),
            phone: Some(phone.to_string()),
            voided: false,
        }
    }

    #[tokio::test]
    async fn locations_roundtrip_and_upsert() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut location = Location {
            id: LocationId::new("be-1"),
            name: Some("Antwerp".into()),
            country: Some("Belgium".into()),
            cluster: None,
        };
        store.upsert_location(&location).await.unwrap();

        location.cluster = Some("North".into());
        store.upsert_location(&location).await.unwrap();

        let locations = store.list_locations().await.unwrap();
        assert_eq!(locations, vec![location]);
    }

    #[tokio::test]
    async fn fetch_orders_by_time_and_respects_limit() {
        let store = SqliteStore::in_memory().await.unwrap();
        for at in [30, 10, 20, 40] {
            store
                .upsert_record(&record(RecordKind::Visit, "be-1", at, false))
                .await
                .unwrap();
        }

        let query = RecordQuery::population(RecordKind::Visit, scope(&["be-1"]));
        let rows = store.fetch_changed(&query, 3).await.unwrap();

        let times: Vec<_> = rows.iter().map(|r| r.modified_at.millis()).collect();
        assert_eq!(times, vec![10, 20, 30]);
        assert_eq!(rows[0].payload, serde_json::json!({ "at": 10 }));
    }

    #[tokio::test]
    async fn fetch_applies_scope_kind_and_time() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (kind, location, at) in [
            (RecordKind::Image, "be-1", 100),
            (RecordKind::Image, "be-1", 101),
            (RecordKind::Image, "nl-1", 200),
            (RecordKind::Visit, "be-1", 300),
        ] {
            store
                .upsert_record(&record(kind, location, at, false))
                .await
                .unwrap();
        }

        let cursor = SyncCursor::new(Some(Timestamp::from_millis(100)), BTreeSet::new(), 10);
        let images = RecordQuery::delta(RecordKind::Image, scope(&["be-1"]), &cursor, None);
        let rows = store.fetch_changed(&images, 10).await.unwrap();
        // Images include the boundary timestamp.
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.location_id.as_str() == "be-1"));

        let visits = RecordQuery::delta(RecordKind::Visit, scope(&["be-1"]), &cursor, None);
        assert_eq!(store.fetch_changed(&visits, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ownership_predicate_filters_rows() {
        let store = SqliteStore::in_memory().await.unwrap();
        let me = DeviceId::new("tablet-1");
        for owner in [None, Some("tablet-1"), Some("tablet-2"), Some("tablet-3")] {
            let mut row = record(RecordKind::Template, "be-1", 5, false);
            row.owner_device = owner.map(DeviceId::new);
            store.upsert_record(&row).await.unwrap();
        }

        let cursor = SyncCursor::new(None, BTreeSet::new(), 10);
        let delta = RecordQuery::delta(RecordKind::Template, scope(&["be-1"]), &cursor, Some(&me));
        assert_eq!(store.fetch_changed(&delta, 10).await.unwrap().len(), 2);

        let foreign = delta.foreign_population(&me).unwrap();
        let split = store.count(&foreign).await.unwrap();
        assert_eq!(split.active + split.voided, 2);
    }

    #[tokio::test]
    async fn count_splits_by_void_flag() {
        let store = SqliteStore::in_memory().await.unwrap();
        for voided in [false, false, true] {
            store
                .upsert_record(&record(RecordKind::Participant, "be-1", 1, voided))
                .await
                .unwrap();
        }
        store
            .upsert_record(&record(RecordKind::Participant, "nl-1", 1, true))
            .await
            .unwrap();

        let query = RecordQuery::population(RecordKind::Participant, scope(&["be-1"]));
        assert_eq!(
            store.count(&query).await.unwrap(),
            VoidSplit {
                active: 2,
                voided: 1,
            }
        );
    }

    #[tokio::test]
    async fn count_of_empty_scope_is_zero() {
        let store = SqliteStore::in_memory().await.unwrap();
        let query = RecordQuery::population(RecordKind::Visit, BTreeSet::new());
        assert_eq!(store.count(&query).await.unwrap(), VoidSplit::default());
    }

    #[tokio::test]
    async fn upsert_record_replaces_by_kind_and_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut row = record(RecordKind::Visit, "be-1", 1, false);
        store.upsert_record(&row).await.unwrap();
        row.voided = true;
        row.modified_at = Timestamp::from_millis(2);
        store.upsert_record(&row).await.unwrap();

        let query = RecordQuery::population(RecordKind::Visit, scope(&["be-1"]));
        let rows = store.fetch_changed(&query, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].voided);
        assert_eq!(rows[0].modified_at.millis(), 2);
    }

    #[tokio::test]
    async fn search_by_phone_and_external_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = participant("be-1", "+32 1", "P-1");
        let bob = participant("be-1", "+32 2", "P-2");
        store.upsert_participant(&alice).await.unwrap();
        store.upsert_participant(&bob).await.unwrap();

        let by_phone = store.search_by_phone(" +32 1 ").await.unwrap();
        assert_eq!(by_phone, vec![alice.to_hit()]);

        let by_id = store.search_by_external_id("P-2").await.unwrap();
        assert_eq!(by_id, vec![bob.to_hit()]);

        assert!(store.search_by_phone("+32 9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn voided_participants_are_invisible() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut ghost = participant("be-1", "+32 1", "P-1");
        ghost.voided = true;
        store.upsert_participant(&ghost).await.unwrap();

        assert!(store.search_by_phone("+32 1").await.unwrap().is_empty());
        assert!(store.participant(&ghost.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn participant_lookup_by_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = participant("be-1", "+32 1", "P-1");
        store.upsert_participant(&alice).await.unwrap();

        assert_eq!(store.participant(&alice.id).await.unwrap(), Some(alice.to_hit()));
        assert!(store.participant(&RecordId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldsync.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store
                .upsert_record(&record(RecordKind::Visit, "be-1", 1, false))
                .await
                .unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        let query = RecordQuery::population(RecordKind::Visit, scope(&["be-1"]));
        assert_eq!(store.count(&query).await.unwrap().active, 1);
    }
}
