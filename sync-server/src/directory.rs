//! Cached location directory.
//!
//! Scope resolution needs the whole location hierarchy on every sync call.
//! The hierarchy changes rarely, so the server holds one [`LocationIndex`]
//! snapshot and swaps it wholesale on refresh. Readers keep the `Arc` they
//! took, so a refresh never changes the index under a running request.

use crate::error::StorageError;
use crate::storage::RecordStore;
use std::sync::Arc;
use sync_core::LocationIndex;
use tokio::sync::RwLock;

/// Shared, periodically refreshed location index.
pub struct LocationDirectory {
    store: Arc<dyn RecordStore>,
    index: RwLock<Arc<LocationIndex>>,
}

impl std::fmt::Debug for LocationDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationDirectory").finish_non_exhaustive()
    }
}

impl LocationDirectory {
    /// Load the directory from the store.
    pub async fn load(store: Arc<dyn RecordStore>) -> Result<Self, StorageError> {
        let index = LocationIndex::build(store.list_locations().await?);
        tracing::info!("Location directory loaded ({} locations)", index.len());
        Ok(Self {
            store,
            index: RwLock::new(Arc::new(index)),
        })
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<LocationIndex> {
        self.index.read().await.clone()
    }

    /// Rebuild the index from the store.
    ///
    /// On failure the previous snapshot stays in place. Returns the number of
    /// locations in the new snapshot.
    pub async fn refresh(&self) -> Result<usize, StorageError> {
        let index = LocationIndex::build(self.store.list_locations().await?);
        let count = index.len();
        *self.index.write().await = Arc::new(index);
        Ok(count)
    }
}
