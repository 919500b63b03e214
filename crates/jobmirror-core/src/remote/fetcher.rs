//! Connection state machine and resolve-then-download for the remote store.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::endpoint::PrinterEndpoint;
use crate::error::{MirrorError, Result};
use crate::lifecycle::Lifecycle;
use crate::retry::ErrorKind;
use crate::storage::PartFile;

use super::{find_match, RemoteEntry, RemoteSession, RemoteStore, SessionError};

const SERVICE: &str = "remote store";

/// Fetcher connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Connected => "connected",
        }
    }
}

/// Read-only view of the fetcher's state, safe to poll without the fetch lock.
#[derive(Debug, Clone)]
pub struct RemoteStatus(Arc<RwLock<ConnState>>);

impl RemoteStatus {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(ConnState::Disconnected)))
    }

    pub fn get(&self) -> ConnState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ConnState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

type SessionSlot = Arc<Mutex<Option<Box<dyn RemoteSession>>>>;

/// Owns the single session to the remote store.
///
/// Callers must serialize `connect` and `resolve_and_download`; the fetch
/// coordinator does so by keeping the fetcher behind its lock.
pub struct RemoteFetcher {
    store: Arc<dyn RemoteStore>,
    endpoint: PrinterEndpoint,
    locations: Vec<String>,
    session: SessionSlot,
    status: RemoteStatus,
    lifecycle: Arc<Lifecycle>,
    teardown_registered: bool,
    op_timeout: Option<Duration>,
}

impl RemoteFetcher {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        endpoint: PrinterEndpoint,
        locations: Vec<String>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            store,
            endpoint,
            locations,
            session: Arc::new(Mutex::new(None)),
            status: RemoteStatus::new(),
            lifecycle,
            teardown_registered: false,
            op_timeout: None,
        }
    }

    /// Backstop timeout for one listing or download, on top of the transport's own.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    pub fn status(&self) -> RemoteStatus {
        self.status.clone()
    }

    pub fn state(&self) -> ConnState {
        self.status.get()
    }

    pub fn is_connected(&self) -> bool {
        if self.status.get() != ConnState::Connected {
            return false;
        }
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| s.is_connected())
    }

    /// Open a fresh session, replacing (not reusing) any previous one.
    pub async fn connect(&mut self) -> Result<()> {
        self.status.set(ConnState::Connecting);
        tracing::info!(host = %self.endpoint.host(), "connecting to {}", SERVICE);

        let store = Arc::clone(&self.store);
        let endpoint = self.endpoint.clone();
        let slot = Arc::clone(&self.session);
        let joined = tokio::task::spawn_blocking(move || {
            let stale = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(mut old) = stale {
                if let Err(e) = old.close() {
                    tracing::debug!("closing stale session: {:#}", e);
                }
            }
            let session = store.connect(&endpoint)?;
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
            Ok::<(), MirrorError>(())
        })
        .await;

        let outcome = match joined {
            Ok(r) => r,
            Err(e) => Err(MirrorError::connection(SERVICE, format!("connect task: {}", e))),
        };
        if let Err(e) = outcome {
            self.status.set(ConnState::Disconnected);
            tracing::warn!("{} connect failed: {}", SERVICE, e);
            return Err(e);
        }

        self.status.set(ConnState::Connected);
        self.register_teardown();
        tracing::info!(host = %self.endpoint.host(), "{} connected", SERVICE);
        Ok(())
    }

    // One teardown per fetcher: it closes whichever session is current at exit.
    fn register_teardown(&mut self) {
        if self.teardown_registered {
            return;
        }
        let slot = Arc::clone(&self.session);
        let status = self.status.clone();
        self.lifecycle.register("remote-store-session", move || {
            let current = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            status.set(ConnState::Disconnected);
            match current {
                Some(mut session) if session.is_connected() => session.close(),
                _ => Ok(()),
            }
        });
        self.teardown_registered = true;
    }

    fn mark_disconnected(&self, reason: &str) {
        if self.status.get() != ConnState::Disconnected {
            tracing::warn!(reason, "{} connection lost", SERVICE);
        }
        self.status.set(ConnState::Disconnected);
    }

    /// Resolve `logical_name` against the remote listing and download the
    /// match to `destination`.
    ///
    /// Returns `Ok(false)` when nothing matches. Reconnects first if the
    /// session is gone. A transfer that reports success without producing
    /// `destination` fails with `DownloadIncomplete`.
    pub async fn resolve_and_download(&mut self, logical_name: &str, destination: &Path) -> Result<bool> {
        if !self.is_connected() {
            tracing::info!("{} not connected; reconnecting on demand", SERVICE);
            self.connect().await?;
        }

        let entries = self.list_entries().await?;
        tracing::debug!(count = entries.len(), "listed remote entries");

        let Some(entry) = find_match(logical_name, &entries).cloned() else {
            tracing::info!(name = logical_name, "no remote entry matches");
            return Ok(false);
        };
        tracing::info!(name = logical_name, remote = %entry.remote_path, "downloading");

        let remote_path = entry.remote_path.clone();
        let dest = destination.to_path_buf();
        let (bytes, published) = self
            .with_session("download", move |session| {
                let mut part = PartFile::new(&dest);
                let bytes = session.download(&remote_path, &mut part)?;
                let published = part.finalize()?;
                Ok((bytes, published))
            })
            .await?;

        if !published || !destination.is_file() {
            return Err(MirrorError::DownloadIncomplete {
                remote_path: entry.remote_path,
                destination: destination.to_path_buf(),
            });
        }
        tracing::info!(remote = %entry.remote_path, bytes, "download complete");
        Ok(true)
    }

    /// List every configured location. Locations that fail without dropping
    /// the session (e.g. a missing directory) are skipped.
    pub async fn list_entries(&self) -> Result<Vec<RemoteEntry>> {
        let locations = self.locations.clone();
        self.with_session("list", move |session| {
            let mut out = Vec::new();
            for location in &locations {
                match session.list(location) {
                    Ok(names) => out.extend(names.into_iter().map(|n| RemoteEntry::new(location, n))),
                    Err(SessionError::Transport { kind, message }) if !kind.drops_session() => {
                        tracing::warn!(location = %location, "listing skipped: {}", message);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(out)
        })
        .await
    }

    async fn with_session<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Box<dyn RemoteSession>) -> std::result::Result<T, SessionError> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.session);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(session) => f(session),
                None => Err(SessionError::transport(ErrorKind::Connection, "no open session")),
            }
        });

        let joined = match self.op_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(j) => j,
                Err(_) => {
                    self.mark_disconnected("operation timed out");
                    return Err(MirrorError::Transfer(format!(
                        "{} timed out after {}s",
                        op,
                        limit.as_secs()
                    )));
                }
            },
            None => task.await,
        };

        match joined {
            Err(e) => Err(MirrorError::Transfer(format!("{} task: {}", op, e))),
            Ok(Ok(v)) => Ok(v),
            Ok(Err(SessionError::Storage(e))) => Err(e),
            Ok(Err(SessionError::Transport { kind, message })) => {
                if kind.drops_session() {
                    self.mark_disconnected(&message);
                }
                Err(MirrorError::Transfer(format!("{}: {}", op, message)))
            }
        }
    }
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("endpoint", &self.endpoint)
            .field("locations", &self.locations)
            .field("state", &self.state())
            .finish()
    }
}
