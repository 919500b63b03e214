//! `jobmirror fetch` – one-shot resolve and download into the cache.

use anyhow::{bail, Result};
use jobmirror_core::config::MirrorConfig;
use jobmirror_core::lifecycle::Lifecycle;
use std::sync::Arc;

use super::build_coordinator;

pub async fn run_fetch(cfg: MirrorConfig, name: &str) -> Result<()> {
    let endpoint = cfg.endpoint()?;
    cfg.validate_tls()?;

    let lifecycle = Arc::new(Lifecycle::new());
    let coordinator = build_coordinator(&cfg, endpoint, &lifecycle)?;
    let outcome = coordinator.get_file(name).await;
    lifecycle.dispose_all();

    match outcome? {
        Some(file) => println!("{}", file.path.display()),
        None => bail!("no file on the printer matches {:?}", name),
    }
    Ok(())
}
