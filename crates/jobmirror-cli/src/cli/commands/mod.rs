//! CLI command handlers, one file per command.

mod completions;
mod fetch;
mod serve;
mod status;

pub use completions::run_completions;
pub use fetch::run_fetch;
pub use serve::run_serve;
pub use status::run_status;

use anyhow::{Context, Result};
use jobmirror_core::config::{self, MirrorConfig};
use jobmirror_core::coordinator::FetchCoordinator;
use jobmirror_core::endpoint::PrinterEndpoint;
use jobmirror_core::lifecycle::Lifecycle;
use jobmirror_core::remote::ftps::{FtpsOptions, FtpsStore};
use jobmirror_core::remote::RemoteFetcher;
use jobmirror_core::storage::CacheStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Load the config file (explicit path or the XDG default), then apply
/// `JOBMIRROR_*` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<MirrorConfig> {
    let mut cfg = match path {
        Some(p) => config::load_or_init_at(p)?,
        None => config::load_or_init()?,
    };
    cfg.apply_env_overrides()
        .context("environment override")?;
    tracing::debug!("loaded config: {:?}", cfg.server);
    Ok(cfg)
}

/// FTPS-backed coordinator over the configured cache directory.
pub(crate) fn build_coordinator(
    cfg: &MirrorConfig,
    endpoint: PrinterEndpoint,
    lifecycle: &Arc<Lifecycle>,
) -> Result<FetchCoordinator> {
    let connect_timeout = Duration::from_secs(cfg.remote.connect_timeout_secs);
    let transfer_timeout = Duration::from_secs(cfg.remote.transfer_timeout_secs);
    let store = FtpsStore::new(FtpsOptions {
        port: cfg.remote.port,
        tls: cfg.tls_policy(),
        ca_file: cfg.tls.ca_file.clone(),
        connect_timeout,
        transfer_timeout,
    });
    let fetcher = RemoteFetcher::new(
        Arc::new(store),
        endpoint,
        cfg.remote.locations.clone(),
        Arc::clone(lifecycle),
    )
    .with_op_timeout(connect_timeout + transfer_timeout);
    let cache = CacheStore::new(cfg.cache_dir()?);
    Ok(FetchCoordinator::new(cache, fetcher))
}
