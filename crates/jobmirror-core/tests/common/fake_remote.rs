//! In-memory remote store with failure injection and call counters.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobmirror_core::endpoint::PrinterEndpoint;
use jobmirror_core::remote::{RemoteSession, RemoteStore, SessionError};
use jobmirror_core::retry::ErrorKind;
use jobmirror_core::storage::PartFile;
use jobmirror_core::MirrorError;

/// How the next downloads behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Normal,
    /// Write half the body, then fail with a connection-level error.
    FailMidway,
    /// Report success without delivering any data.
    Empty,
}

#[derive(Debug)]
struct State {
    dirs: BTreeMap<String, Vec<(String, Vec<u8>)>>,
    mode: DownloadMode,
    delay: Duration,
    refuse_connect: bool,
    connects: usize,
    lists: usize,
    downloads: usize,
    closes: usize,
    live_sessions: usize,
}

/// Cloneable handle: the clone given to the fetcher and the one kept by the
/// test share state.
#[derive(Debug, Clone)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    /// Store with the usual two locations, both empty.
    pub fn new() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert("/".to_string(), Vec::new());
        dirs.insert("/model".to_string(), Vec::new());
        Self {
            state: Arc::new(Mutex::new(State {
                dirs,
                mode: DownloadMode::Normal,
                delay: Duration::ZERO,
                refuse_connect: false,
                connects: 0,
                lists: 0,
                downloads: 0,
                closes: 0,
                live_sessions: 0,
            })),
        }
    }

    pub fn with_file(self, location: &str, name: &str, body: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .dirs
            .entry(location.to_string())
            .or_default()
            .push((name.to_string(), body.to_vec()));
        self
    }

    pub fn without_location(self, location: &str) -> Self {
        self.state.lock().unwrap().dirs.remove(location);
        self
    }

    pub fn set_mode(&self, mode: DownloadMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn set_refuse_connect(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_connect = refuse;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn lists(&self) -> usize {
        self.state.lock().unwrap().lists
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().unwrap().live_sessions
    }
}

impl RemoteStore for FakeStore {
    fn connect(&self, endpoint: &PrinterEndpoint) -> jobmirror_core::Result<Box<dyn RemoteSession>> {
        let mut st = self.state.lock().unwrap();
        st.connects += 1;
        if st.refuse_connect {
            return Err(MirrorError::Connection {
                service: "remote store",
                reason: format!("{} refused login", endpoint.host()),
            });
        }
        st.live_sessions += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            connected: true,
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<State>>,
    connected: bool,
}

impl FakeSession {
    fn drop_connection(&mut self, st: &mut State) {
        if self.connected {
            self.connected = false;
            st.live_sessions -= 1;
        }
    }
}

impl RemoteSession for FakeSession {
    fn list(&mut self, location: &str) -> Result<Vec<String>, SessionError> {
        if !self.connected {
            return Err(SessionError::transport(ErrorKind::Connection, "not connected"));
        }
        let mut st = self.state.lock().unwrap();
        st.lists += 1;
        match st.dirs.get(location) {
            Some(entries) => Ok(entries.iter().map(|(n, _)| n.clone()).collect()),
            None => Err(SessionError::transport(
                ErrorKind::Other,
                format!("550 {}: no such directory", location),
            )),
        }
    }

    fn download(&mut self, remote_path: &str, sink: &mut PartFile) -> Result<u64, SessionError> {
        if !self.connected {
            return Err(SessionError::transport(ErrorKind::Connection, "not connected"));
        }
        let (body, mode, delay) = {
            let mut st = self.state.lock().unwrap();
            st.downloads += 1;
            let body = st
                .dirs
                .iter()
                .flat_map(|(loc, entries)| {
                    entries.iter().filter_map(move |(name, body)| {
                        let path = if loc.ends_with('/') {
                            format!("{}{}", loc, name)
                        } else {
                            format!("{}/{}", loc, name)
                        };
                        (path == remote_path).then(|| body.clone())
                    })
                })
                .next();
            (body, st.mode, st.delay)
        };
        let Some(body) = body else {
            return Err(SessionError::transport(ErrorKind::Other, format!("550 {}", remote_path)));
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match mode {
            DownloadMode::Normal => {
                for chunk in body.chunks(4) {
                    sink.write_chunk(chunk)?;
                }
                Ok(body.len() as u64)
            }
            DownloadMode::FailMidway => {
                sink.write_chunk(&body[..body.len() / 2])?;
                let state = Arc::clone(&self.state);
                let mut st = state.lock().unwrap();
                self.drop_connection(&mut st);
                Err(SessionError::transport(ErrorKind::Connection, "connection reset by peer"))
            }
            DownloadMode::Empty => Ok(0),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) -> anyhow::Result<()> {
        let state = Arc::clone(&self.state);
        let mut st = state.lock().unwrap();
        if self.connected {
            st.closes += 1;
        }
        self.drop_connection(&mut st);
        Ok(())
    }
}
