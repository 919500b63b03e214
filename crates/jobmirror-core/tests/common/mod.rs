#![allow(dead_code)]

pub mod fake_link;
pub mod fake_remote;

use std::sync::Arc;
use std::time::Duration;

use jobmirror_core::coordinator::FetchCoordinator;
use jobmirror_core::endpoint::PrinterEndpoint;
use jobmirror_core::lifecycle::Lifecycle;
use jobmirror_core::remote::RemoteFetcher;
use jobmirror_core::storage::CacheStore;

use fake_remote::FakeStore;

pub const SERIAL: &str = "01P00A000000001";

pub fn endpoint() -> PrinterEndpoint {
    PrinterEndpoint::new("192.168.1.40", "12345678", SERIAL)
}

pub fn locations() -> Vec<String> {
    vec!["/".to_string(), "/model".to_string()]
}

/// Coordinator over `store`, caching into `cache_dir`.
pub fn coordinator(store: &FakeStore, cache_dir: &std::path::Path, lifecycle: &Arc<Lifecycle>) -> FetchCoordinator {
    let fetcher = RemoteFetcher::new(
        Arc::new(store.clone()),
        endpoint(),
        locations(),
        Arc::clone(lifecycle),
    );
    FetchCoordinator::new(CacheStore::new(cache_dir), fetcher)
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
