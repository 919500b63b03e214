//! Telemetry connection state machine and receive loop.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::endpoint::PrinterEndpoint;
use crate::error::{MirrorError, Result};
use crate::lifecycle::Lifecycle;
use crate::retry::{ErrorKind, RetryPolicy};

use super::report::{init_request, parse_report};
use super::snapshot::SnapshotHandle;
use super::{LinkError, LinkEvent, LinkState, TelemetryLink};

const SERVICE: &str = "telemetry";

/// Timing knobs for the tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Bound on the transport accepting the session.
    pub connect_timeout: Duration,
    /// Wait after `open` before the connected check.
    pub settle: Duration,
    /// Backoff between reconnect attempts in the receive loop.
    pub retry: RetryPolicy,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            settle: Duration::from_millis(1500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared, read-mostly view of the tracker's link state.
#[derive(Debug, Clone)]
pub struct LinkStatus(Arc<RwLock<LinkState>>);

impl LinkStatus {
    /// A detached status, starting `Disconnected`.
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(LinkState::Disconnected)))
    }

    pub fn get(&self) -> LinkState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: LinkState) {
        let mut cur = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if *cur != state {
            tracing::debug!(from = cur.as_str(), to = state.as_str(), "telemetry state");
            *cur = state;
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running tracker.
#[derive(Debug)]
pub struct TrackerHandle {
    snapshot: SnapshotHandle,
    status: LinkStatus,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn snapshot(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    /// True once the receive loop has exited (link finished or aborted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the receive loop to exit after the lifecycle teardown asked
    /// the link to close. The loop is aborted if it is still running after
    /// `grace`; returns false in that case.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "telemetry loop still running; aborting");
                self.task.abort();
                false
            }
        }
    }
}

/// Owns the telemetry link until `connect` hands it to the receive loop.
pub struct TelemetryTracker<L> {
    link: L,
    endpoint: PrinterEndpoint,
    settings: TrackerSettings,
    snapshot: SnapshotHandle,
    status: LinkStatus,
}

impl<L: TelemetryLink> TelemetryTracker<L> {
    pub fn new(link: L, endpoint: PrinterEndpoint, settings: TrackerSettings) -> Self {
        Self {
            link,
            endpoint,
            settings,
            snapshot: SnapshotHandle::new(),
            status: LinkStatus::new(),
        }
    }

    pub fn snapshot(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    /// Connect, subscribe and start the receive loop.
    ///
    /// Fails with `Connection` if the transport does not accept the session
    /// within `connect_timeout` or the subscription is refused, and with
    /// `ConnectionTimeout` if the session is not connected after `settle`.
    pub async fn connect(mut self, lifecycle: &Lifecycle) -> Result<TrackerHandle> {
        self.status.set(LinkState::Connecting);
        tracing::info!(host = %self.endpoint.host(), "connecting to {}", SERVICE);

        match tokio::time::timeout(self.settings.connect_timeout, self.link.open()).await {
            Err(_) => {
                self.status.set(LinkState::Disconnected);
                return Err(MirrorError::connection(
                    SERVICE,
                    format!(
                        "no answer within {}s",
                        self.settings.connect_timeout.as_secs_f32()
                    ),
                ));
            }
            Ok(Err(e)) => {
                self.status.set(LinkState::Disconnected);
                return Err(MirrorError::connection(SERVICE, e));
            }
            Ok(Ok(())) => {}
        }

        // The receive loop keeps polling after this runs so the close
        // request reaches the wire; `TrackerHandle::shutdown` reaps it.
        {
            let closer = self.link.closer();
            let status = self.status.clone();
            lifecycle.register("telemetry-session", move || {
                status.set(LinkState::Disconnected);
                closer()
            });
        }

        self.link.settle(self.settings.settle).await;
        if !self.link.is_connected() {
            self.status.set(LinkState::Disconnected);
            return Err(MirrorError::ConnectionTimeout {
                service: SERVICE,
                waited_ms: self.settings.settle.as_millis() as u64,
            });
        }
        self.status.set(LinkState::Connected);

        let mut sequence = 0u64;
        prime(&mut self.link, &self.endpoint, &mut sequence)
            .await
            .map_err(|e| MirrorError::connection(SERVICE, format!("subscribe: {}", e)))?;
        self.status.set(LinkState::Subscribed);
        tracing::info!(topic = %self.endpoint.report_topic(), "telemetry subscribed");

        let TelemetryTracker {
            link,
            endpoint,
            settings,
            snapshot,
            status,
        } = self;
        let task = tokio::spawn(receive_loop(
            link,
            endpoint,
            settings.retry,
            snapshot.clone(),
            status.clone(),
            sequence,
        ));

        Ok(TrackerHandle {
            snapshot,
            status,
            task,
        })
    }
}

/// Subscribe to the report topic and ask for a full status push.
/// A failed push request is logged only; the next periodic report fills in.
async fn prime<L: TelemetryLink>(
    link: &mut L,
    endpoint: &PrinterEndpoint,
    sequence: &mut u64,
) -> std::result::Result<(), LinkError> {
    link.subscribe(&endpoint.report_topic()).await?;
    *sequence += 1;
    if let Err(e) = link
        .publish(&endpoint.request_topic(), init_request(*sequence))
        .await
    {
        tracing::warn!("initialization request not sent: {}", e);
    }
    Ok(())
}

/// Apply one inbound message to the snapshot. Malformed payloads are dropped.
pub(crate) fn handle_message(snapshot: &SnapshotHandle, topic: &str, payload: &[u8]) {
    match parse_report(payload) {
        Ok(update) => snapshot.apply(update),
        Err(e) => tracing::debug!(topic, len = payload.len(), "discarding malformed report: {}", e),
    }
}

async fn receive_loop<L: TelemetryLink>(
    mut link: L,
    endpoint: PrinterEndpoint,
    retry: RetryPolicy,
    snapshot: SnapshotHandle,
    status: LinkStatus,
    mut sequence: u64,
) {
    let mut attempt = 0u32;
    let mut needs_prime = false;

    loop {
        match link.next_event().await {
            LinkEvent::Message { topic, payload } => handle_message(&snapshot, &topic, &payload),
            LinkEvent::Connected => {
                attempt = 0;
                status.set(LinkState::Connected);
                tracing::info!("telemetry session re-established");
                if needs_prime {
                    match prime(&mut link, &endpoint, &mut sequence).await {
                        Ok(()) => needs_prime = false,
                        Err(e) => {
                            tracing::warn!("re-subscribe failed: {}", e);
                            continue;
                        }
                    }
                }
                status.set(LinkState::Subscribed);
            }
            LinkEvent::Closed(reason) => {
                tracing::info!(reason = %reason, "telemetry session closed");
                status.set(LinkState::Disconnected);
                needs_prime = true;
                attempt = attempt.saturating_add(1);
                backoff(&retry, attempt, ErrorKind::Connection).await;
            }
            LinkEvent::Errored { kind, message } => {
                tracing::warn!(?kind, "telemetry session error: {}", message);
                status.set(LinkState::Disconnected);
                needs_prime = true;
                attempt = attempt.saturating_add(1);
                backoff(&retry, attempt, kind).await;
            }
            LinkEvent::Idle => {}
            LinkEvent::Finished => {
                tracing::info!("telemetry link finished");
                status.set(LinkState::Disconnected);
                break;
            }
        }
    }
}

async fn backoff(retry: &RetryPolicy, attempt: u32, kind: ErrorKind) {
    let delay = retry.reconnect_delay(attempt, kind);
    tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "telemetry reconnecting");
    tokio::time::sleep(delay).await;
}
