//! Incremental record sync.
//!
//! One sync call serves one record kind:
//!
//! ```text
//! SyncRequest ─► SyncCursor::from_request ─► LocationIndex::resolve
//!                                                  │
//!                      ┌───────────────────────────┴──────────────┐
//!                      ▼                                          ▼
//!              DeltaQueryEngine::fetch                CountReconciler::summarize
//!                      └───────────────────────────┬──────────────┘
//!                                                  ▼
//!                                   SyncResponseAssembler::assemble
//! ```
//!
//! The fetch and the count are independent reads and run concurrently.

use crate::directory::LocationDirectory;
use crate::error::{Result, StorageError};
use crate::storage::RecordStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use sync_core::{
    reconcile, requesting_device, summarize, DeltaPage, RecordQuery, SyncCursor,
    SyncResponseAssembler, VoidSplit,
};
use sync_types::{
    CountSummary, DeviceId, LocationId, RecordKind, SyncError, SyncRequest, SyncResponse,
};

/// Fetches the page of changed records for a cursor.
#[derive(Clone)]
pub struct DeltaQueryEngine {
    store: Arc<dyn RecordStore>,
}

impl DeltaQueryEngine {
    /// Create an engine reading from `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Fetch the next page of `kind` records for a cursor.
    ///
    /// Over-fetches by the size of the known set so that dropping rows the
    /// device already holds still leaves a full page. With `optimize_for`,
    /// image and template rows owned by other devices are left out.
    pub async fn fetch(
        &self,
        kind: RecordKind,
        cursor: &SyncCursor,
        location_ids: &BTreeSet<LocationId>,
        optimize_for: Option<&DeviceId>,
    ) -> Result<DeltaPage> {
        if location_ids.is_empty() {
            return Err(SyncError::NotFound("location scope matched no locations".into()).into());
        }

        let query = RecordQuery::delta(kind, location_ids.clone(), cursor, optimize_for);
        let rows = self.store.fetch_changed(&query, cursor.fetch_limit()).await?;
        Ok(reconcile(rows, cursor))
    }
}

/// Counts the whole population of a scope.
#[derive(Clone)]
pub struct CountReconciler {
    store: Arc<dyn RecordStore>,
}

impl CountReconciler {
    /// Create a reconciler reading from `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Count every `kind` record in the locations, ignoring cursor and limit.
    ///
    /// `ignored` is present only when `optimize_for` is given. It counts the
    /// rows another device owns; kinds without ownership report 0.
    pub async fn summarize(
        &self,
        kind: RecordKind,
        location_ids: &BTreeSet<LocationId>,
        optimize_for: Option<&DeviceId>,
    ) -> Result<CountSummary> {
        let population = RecordQuery::population(kind, location_ids.clone());

        let ignored = async {
            let Some(device) = optimize_for else {
                return Ok::<_, StorageError>(None);
            };
            match population.foreign_population(device) {
                Some(foreign) => {
                    let split: VoidSplit = self.store.count(&foreign).await?;
                    Ok(Some(split.active + split.voided))
                }
                None => Ok(Some(0)),
            }
        };

        let (split, ignored) = tokio::try_join!(self.store.count(&population), ignored)?;
        Ok(summarize(split, ignored))
    }
}

/// Sync orchestration: validate, resolve, fetch and count, assemble.
pub struct SyncService {
    directory: Arc<LocationDirectory>,
    engine: DeltaQueryEngine,
    counts: CountReconciler,
    assembler: SyncResponseAssembler,
    max_limit: usize,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("max_limit", &self.max_limit)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Create a sync service.
    ///
    /// `max_limit` clamps the page size a device may ask for.
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<LocationDirectory>,
        max_limit: usize,
    ) -> Self {
        Self {
            directory,
            engine: DeltaQueryEngine::new(store.clone()),
            counts: CountReconciler::new(store),
            assembler: SyncResponseAssembler,
            max_limit,
        }
    }

    /// Serve one sync call.
    pub async fn sync(&self, kind: RecordKind, request: &SyncRequest) -> Result<SyncResponse> {
        let cursor = SyncCursor::from_request(request, self.max_limit)?;
        let locations = self.directory.snapshot().await;
        let location_ids = locations.resolve(&request.scope)?;
        let device = if request.optimize {
            requesting_device(request)
        } else {
            None
        };

        let (page, counts) = tokio::try_join!(
            self.engine.fetch(kind, &cursor, &location_ids, device),
            self.counts.summarize(kind, &location_ids, device),
        )?;

        if !page.duplicates.is_empty() {
            tracing::warn!(
                "Dropped {} duplicate {} ids from page: {:?}",
                page.duplicates.len(),
                kind.as_str(),
                page.duplicates
            );
        }

        if page.split_group {
            tracing::info!(
                "{} timestamp group exceeds limit {}; device resumes inside it",
                kind.as_str(),
                cursor.limit()
            );
        }

        tracing::debug!(
            kind = kind.as_str(),
            locations = location_ids.len(),
            delivered = page.records.len(),
            skipped_known = page.skipped_known,
            held_back = page.held_back,
            total = counts.total(),
            "sync served"
        );

        Ok(self.assembler.assemble(page.records, counts, request))
    }
}
