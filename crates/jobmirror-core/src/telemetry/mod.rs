//! Telemetry stream: subscription, report parsing and the live snapshot.
//!
//! `TelemetryLink` is the transport seam (MQTT in production, see `mqtt`).
//! `TelemetryTracker` drives it: connect, settle check, subscribe, send the
//! initialization request, then hand the link to a receive loop task that
//! owns it for the rest of the process.

pub mod mqtt;
mod report;
mod snapshot;
mod tracker;

pub use report::{init_request, parse_report};
pub use snapshot::{ReportUpdate, SnapshotHandle, TelemetrySnapshot};
pub use tracker::{LinkStatus, TelemetryTracker, TrackerHandle, TrackerSettings};

use async_trait::async_trait;

use crate::retry::ErrorKind;

/// Tracker-side connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Subscribed => "subscribed",
        }
    }
}

/// Transport failure surfaced by a link.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct LinkError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LinkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What the receive loop sees from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Session (re)established by the transport.
    Connected,
    /// Inbound message.
    Message { topic: String, payload: Vec<u8> },
    /// Peer or transport closed the session.
    Closed(String),
    /// Transport error; the next `next_event` call attempts to reconnect.
    Errored { kind: ErrorKind, message: String },
    /// Outgoing traffic, pings and other bookkeeping.
    Idle,
    /// The link is shut down for good.
    Finished,
}

/// Teardown handle for a link, callable from any thread.
pub type LinkCloser = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Publish/subscribe transport with credentials.
#[async_trait]
pub trait TelemetryLink: Send + 'static {
    /// Open the session; resolves once the transport accepts it.
    async fn open(&mut self) -> Result<(), LinkError>;

    fn is_connected(&self) -> bool;

    /// Let the session run for `window` after `open` so an early drop
    /// shows up in `is_connected`.
    async fn settle(&mut self, window: std::time::Duration) {
        tokio::time::sleep(window).await;
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), LinkError>;

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), LinkError>;

    /// Wait for the next event; also drives reconnects after errors.
    async fn next_event(&mut self) -> LinkEvent;

    /// Closure that asks the session to end gracefully. It only queues the
    /// request: `next_event` must keep being polled until it returns
    /// `Finished` for the close to reach the peer.
    fn closer(&self) -> LinkCloser;
}
