//! Single-flight access to the local cache.
//!
//! Every `get_file` runs under one process-wide lock: a cache hit returns
//! immediately, a miss downloads through the remote fetcher before the lock
//! is released. Concurrent requests for the same name therefore trigger one
//! download, and requests for different names never overlap on the remote
//! session.

use tokio::sync::Mutex;

use crate::error::Result;
use crate::remote::{RemoteFetcher, RemoteStatus};
use crate::storage::{CacheKey, CacheStore, CachedFile};

/// Cache plus the fetcher that fills it.
#[derive(Debug)]
pub struct FetchCoordinator {
    store: CacheStore,
    fetcher: Mutex<RemoteFetcher>,
    remote_status: RemoteStatus,
}

impl FetchCoordinator {
    pub fn new(store: CacheStore, fetcher: RemoteFetcher) -> Self {
        let remote_status = fetcher.status();
        Self {
            store,
            fetcher: Mutex::new(fetcher),
            remote_status,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Fetcher state, readable without waiting for an in-flight download.
    pub fn remote_status(&self) -> RemoteStatus {
        self.remote_status.clone()
    }

    /// Open the remote session ahead of the first request.
    pub async fn connect(&self) -> Result<()> {
        self.fetcher.lock().await.connect().await
    }

    /// Return the cached copy of `logical_name`, downloading it on a miss.
    ///
    /// `Ok(None)` means the remote store has no entry with that name.
    pub async fn get_file(&self, logical_name: &str) -> Result<Option<CachedFile>> {
        let mut fetcher = self.fetcher.lock().await;

        self.store.ensure_dir()?;
        let key = CacheKey::new(logical_name)?;
        if let Some(hit) = self.store.lookup(&key) {
            tracing::debug!(name = logical_name, "cache hit");
            return Ok(Some(hit));
        }

        tracing::info!(name = logical_name, "cache miss; fetching from remote store");
        let path = self.store.path_for(&key);
        if !fetcher.resolve_and_download(logical_name, &path).await? {
            return Ok(None);
        }
        Ok(Some(CachedFile { key, path }))
    }
}
