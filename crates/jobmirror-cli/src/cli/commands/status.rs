//! `jobmirror status` – show the resolved configuration.

use anyhow::Result;
use jobmirror_core::config::MirrorConfig;

pub fn run_status(cfg: &MirrorConfig) -> Result<()> {
    let p = &cfg.printer;
    let cache_dir = cfg.cache_dir()?;
    let row = |key: &str, value: &str| println!("{:<20} {}", key, value);

    row("printer.host", or_unset(&p.host));
    row("printer.serial", or_unset(&p.serial));
    row("printer.access_code", &mask(&p.access_code));
    row("server", &format!("{}:{}", cfg.server.bind, cfg.server.port));
    row("cache.dir", &cache_dir.display().to_string());
    row(
        "remote",
        &format!("port {} locations {}", cfg.remote.port, cfg.remote.locations.join(",")),
    );
    row("telemetry", &format!("port {}", cfg.telemetry.port));
    row(
        "tls.accept_self_signed",
        if cfg.tls.accept_self_signed { "yes" } else { "no" },
    );

    if let Err(e) = cfg.endpoint().map(|_| ()).and_then(|_| cfg.validate_tls()) {
        println!();
        println!("not ready to serve: {}", e);
    }
    Ok(())
}

fn or_unset(v: &str) -> &str {
    if v.trim().is_empty() {
        "(unset)"
    } else {
        v
    }
}

/// Hide the access code but show whether one is set.
fn mask(code: &str) -> String {
    if code.is_empty() {
        "(unset)".to_string()
    } else {
        "*".repeat(code.chars().count().min(8))
    }
}
