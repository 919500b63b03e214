//! Remote file store: listing, name resolution and download.
//!
//! The store is reached through `RemoteStore`/`RemoteSession`, blocking
//! traits implemented over curl (`ftps`) in production and by in-memory fakes
//! in tests. `RemoteFetcher` owns the one session and drives it from async
//! code via `spawn_blocking`.

mod fetcher;
pub mod ftps;

pub use fetcher::{ConnState, RemoteFetcher, RemoteStatus};

use crate::endpoint::PrinterEndpoint;
use crate::error::{MirrorError, Result};
use crate::retry::ErrorKind;
use crate::storage::PartFile;

/// Character whitespace runs collapse to when comparing names.
pub const NAME_FILLER: char = '_';

/// Error from an established session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level failure; `kind` decides whether the session survives.
    #[error("{message}")]
    Transport { kind: ErrorKind, message: String },
    /// Local write failed while receiving data.
    #[error(transparent)]
    Storage(#[from] MirrorError),
}

impl SessionError {
    pub fn transport(kind: ErrorKind, message: impl Into<String>) -> Self {
        SessionError::Transport {
            kind,
            message: message.into(),
        }
    }
}

/// Factory for sessions against one kind of store.
pub trait RemoteStore: Send + Sync {
    /// Open and authenticate a session. Runs on a blocking thread.
    /// A failed attempt must release anything it partially opened.
    fn connect(&self, endpoint: &PrinterEndpoint) -> Result<Box<dyn RemoteSession>>;
}

/// One authenticated session. Not safe for concurrent exchanges; the fetcher
/// serializes access.
pub trait RemoteSession: Send {
    /// Names of the entries directly inside `location`.
    fn list(&mut self, location: &str) -> std::result::Result<Vec<String>, SessionError>;

    /// Stream `remote_path` into `sink`; returns the byte count.
    fn download(
        &mut self,
        remote_path: &str,
        sink: &mut PartFile,
    ) -> std::result::Result<u64, SessionError>;

    fn is_connected(&self) -> bool;

    /// Close the session. Must be a no-op when already closed.
    fn close(&mut self) -> anyhow::Result<()>;
}

/// One listed entry, qualified by the location it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub display_name: String,
    pub location: String,
    pub remote_path: String,
}

impl RemoteEntry {
    pub fn new(location: &str, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let remote_path = if location.ends_with('/') {
            format!("{}{}", location, display_name)
        } else {
            format!("{}/{}", location, display_name)
        };
        Self {
            display_name,
            location: location.to_string(),
            remote_path,
        }
    }
}

/// Collapse every whitespace run into a single `NAME_FILLER`.
///
/// The telemetry stream and the file store disagree on how spaces in a job
/// name are presented; comparing normalized forms tolerates both.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(NAME_FILLER);
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// First entry whose normalized display name equals the normalized logical name.
pub fn find_match<'a>(logical_name: &str, entries: &'a [RemoteEntry]) -> Option<&'a RemoteEntry> {
    let wanted = normalize_name(logical_name);
    entries
        .iter()
        .find(|e| normalize_name(&e.display_name) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(names: &[(&str, &str)]) -> Vec<RemoteEntry> {
        names.iter().map(|(loc, n)| RemoteEntry::new(loc, *n)).collect()
    }

    #[test]
    fn whitespace_runs_collapse_to_filler() {
        assert_eq!(normalize_name("a b.gcode"), "a_b.gcode");
        assert_eq!(normalize_name("a \t  b.gcode"), "a_b.gcode");
        assert_eq!(normalize_name("a_b.gcode"), "a_b.gcode");
    }

    #[test]
    fn space_matches_filler_but_not_missing_space() {
        let listed = entries(&[("/", "ab.gcode"), ("/model", "a_b.gcode")]);
        let hit = find_match("a b.gcode", &listed).unwrap();
        assert_eq!(hit.remote_path, "/model/a_b.gcode");

        let only_joined = entries(&[("/", "ab.gcode")]);
        assert!(find_match("a b.gcode", &only_joined).is_none());
    }

    #[test]
    fn filler_in_request_matches_space_in_listing() {
        let listed = entries(&[("/", "Big Benchy.3mf")]);
        assert_eq!(
            find_match("Big_Benchy.3mf", &listed).unwrap().remote_path,
            "/Big Benchy.3mf"
        );
    }

    #[test]
    fn first_match_wins() {
        let listed = entries(&[("/", "cube.gcode"), ("/model", "cube.gcode")]);
        assert_eq!(find_match("cube.gcode", &listed).unwrap().location, "/");
    }

    #[test]
    fn remote_path_joins_location() {
        assert_eq!(RemoteEntry::new("/", "x").remote_path, "/x");
        assert_eq!(RemoteEntry::new("/model", "x").remote_path, "/model/x");
        assert_eq!(RemoteEntry::new("/model/", "x").remote_path, "/model/x");
    }
}
