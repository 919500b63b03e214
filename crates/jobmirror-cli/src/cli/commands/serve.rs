//! `jobmirror serve` – connect both printer services and serve the HTTP API.

use anyhow::{Context, Result};
use jobmirror_core::config::MirrorConfig;
use jobmirror_core::endpoint::PrinterEndpoint;
use jobmirror_core::lifecycle::Lifecycle;
use jobmirror_core::query::QuerySurface;
use jobmirror_core::retry::RetryPolicy;
use jobmirror_core::telemetry::mqtt::{MqttLink, MqttSettings};
use jobmirror_core::telemetry::{TelemetryTracker, TrackerHandle, TrackerSettings};
use std::sync::Arc;
use std::time::Duration;

use super::build_coordinator;
use crate::http;

/// How long the telemetry loop gets to send its disconnect before it is aborted.
const TELEMETRY_CLOSE_GRACE: Duration = Duration::from_secs(2);

pub async fn run_serve(cfg: MirrorConfig) -> Result<()> {
    let endpoint = cfg.endpoint()?;
    cfg.validate_tls()?;
    let retry = cfg.retry_policy()?;

    let lifecycle = Arc::new(Lifecycle::new());
    let mut telemetry = None;
    let result = serve_until_shutdown(&cfg, endpoint, retry, &lifecycle, &mut telemetry).await;

    let report = lifecycle.dispose_all();
    if !report.failed.is_empty() {
        tracing::warn!(failed = ?report.failed, "some connections did not close cleanly");
    }
    if let Some(handle) = telemetry {
        handle.shutdown(TELEMETRY_CLOSE_GRACE).await;
    }
    result
}

async fn serve_until_shutdown(
    cfg: &MirrorConfig,
    endpoint: PrinterEndpoint,
    retry: RetryPolicy,
    lifecycle: &Arc<Lifecycle>,
    telemetry_slot: &mut Option<TrackerHandle>,
) -> Result<()> {
    let coordinator = Arc::new(build_coordinator(cfg, endpoint.clone(), lifecycle)?);
    coordinator
        .connect()
        .await
        .context("initial remote store connection")?;

    let link = MqttLink::new(
        endpoint.clone(),
        MqttSettings {
            port: cfg.telemetry.port,
            keep_alive: Duration::from_secs(cfg.telemetry.keep_alive_secs),
            tls: cfg.tls_policy(),
            ca_file: cfg.tls.ca_file.clone(),
            ..MqttSettings::default()
        },
    );
    let settings = TrackerSettings {
        connect_timeout: Duration::from_secs(cfg.telemetry.connect_timeout_secs),
        settle: Duration::from_millis(cfg.telemetry.settle_millis),
        retry,
    };
    let telemetry = TelemetryTracker::new(link, endpoint, settings)
        .connect(lifecycle)
        .await
        .context("initial telemetry connection")?;

    let surface = Arc::new(QuerySurface::new(
        telemetry.snapshot(),
        telemetry.status(),
        coordinator,
    ));
    *telemetry_slot = Some(telemetry);

    let addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, http::router(surface))
        .with_graceful_shutdown(http::shutdown_signal())
        .await
        .context("http server")?;

    tracing::info!("http server stopped; releasing connections");
    Ok(())
}
