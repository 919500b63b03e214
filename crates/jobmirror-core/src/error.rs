//! Error taxonomy shared by the cache, the fetcher and the tracker.

use std::path::PathBuf;

/// Errors raised by the mirroring core.
///
/// Connection failures are fatal at startup and local afterwards; storage
/// errors always propagate; `DownloadIncomplete` ends a single fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Initial handshake with a remote service failed.
    #[error("{service} connection failed: {reason}")]
    Connection {
        service: &'static str,
        reason: String,
    },

    /// Transport accepted the session but it did not settle in time.
    #[error("{service} connection did not settle within {waited_ms} ms")]
    ConnectionTimeout {
        service: &'static str,
        waited_ms: u64,
    },

    /// Remote reported success but no local artifact appeared.
    #[error("download of {remote_path} reported success but produced no file at {}", destination.display())]
    DownloadIncomplete {
        remote_path: String,
        destination: PathBuf,
    },

    /// Local filesystem failure.
    #[error("storage {op} failed for {}: {source}", path.display())]
    Storage {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Logical name cannot be mapped to a cache entry.
    #[error("invalid cache name: {0:?}")]
    InvalidName(String),

    /// Remote transfer failed after the session was established.
    #[error("remote transfer failed: {0}")]
    Transfer(String),
}

impl MirrorError {
    pub(crate) fn storage(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::Storage {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn connection(service: &'static str, reason: impl std::fmt::Display) -> Self {
        MirrorError::Connection {
            service,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
