//! Implicit-TLS FTP store over libcurl.
//!
//! One `curl::easy::Easy` handle per session; libcurl keeps the control
//! connection alive between transfers on the same handle, so listings and
//! downloads after `connect` reuse the authenticated session.

use std::path::PathBuf;
use std::time::Duration;

use curl::easy::Easy;
use url::Url;

use crate::endpoint::{PrinterEndpoint, TlsPolicy, DEVICE_USER};
use crate::error::{MirrorError, Result};
use crate::retry::{classify_curl_error, ErrorKind};
use crate::storage::PartFile;

use super::{RemoteSession, RemoteStore, SessionError};

const SERVICE: &str = "remote store";

/// Settings for `FtpsStore`.
#[derive(Debug, Clone)]
pub struct FtpsOptions {
    pub port: u16,
    pub tls: TlsPolicy,
    /// CA bundle used when self-signed certificates are not accepted.
    pub ca_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl Default for FtpsOptions {
    fn default() -> Self {
        Self {
            port: 990,
            tls: TlsPolicy {
                accept_self_signed: true,
            },
            ca_file: None,
            connect_timeout: Duration::from_secs(15),
            transfer_timeout: Duration::from_secs(600),
        }
    }
}

/// `RemoteStore` speaking FTPS (`ftps://`, TLS from the first byte).
#[derive(Debug, Clone)]
pub struct FtpsStore {
    opts: FtpsOptions,
}

impl FtpsStore {
    pub fn new(opts: FtpsOptions) -> Self {
        Self { opts }
    }

    fn base_url(&self, endpoint: &PrinterEndpoint) -> Result<Url> {
        let raw = format!("ftps://{}:{}/", endpoint.host(), self.opts.port);
        Url::parse(&raw).map_err(|e| MirrorError::connection(SERVICE, format!("bad url {}: {}", raw, e)))
    }

    fn configure(&self, easy: &mut Easy, endpoint: &PrinterEndpoint) -> std::result::Result<(), curl::Error> {
        easy.username(DEVICE_USER)?;
        easy.password(endpoint.access_code())?;
        let verify = !self.opts.tls.accept_self_signed;
        easy.ssl_verify_peer(verify)?;
        easy.ssl_verify_host(verify)?;
        if let (true, Some(ca)) = (verify, self.opts.ca_file.as_ref()) {
            easy.cainfo(ca)?;
        }
        easy.connect_timeout(self.opts.connect_timeout)?;
        easy.timeout(self.opts.transfer_timeout)?;
        easy.low_speed_limit(1)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        Ok(())
    }
}

impl RemoteStore for FtpsStore {
    fn connect(&self, endpoint: &PrinterEndpoint) -> Result<Box<dyn RemoteSession>> {
        let base = self.base_url(endpoint)?;
        let mut easy = Easy::new();
        self.configure(&mut easy, endpoint)
            .map_err(|e| MirrorError::connection(SERVICE, e))?;

        // Log in without transferring anything.
        easy.url(base.as_str())
            .and_then(|_| easy.nobody(true))
            .and_then(|_| easy.perform())
            .map_err(|e| {
                tracing::debug!(kind = ?classify_curl_error(&e), "ftps login failed");
                MirrorError::connection(SERVICE, e)
            })?;

        Ok(Box::new(FtpsSession {
            easy: Some(easy),
            base,
        }))
    }
}

/// Authenticated FTPS session.
pub struct FtpsSession {
    easy: Option<Easy>,
    base: Url,
}

impl FtpsSession {
    /// URL for a remote path; each segment is percent-encoded.
    /// `dir` appends a trailing slash so curl treats it as a listing target.
    fn url_for(&self, remote_path: &str, dir: bool) -> std::result::Result<Url, SessionError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SessionError::transport(ErrorKind::Other, "base url cannot have a path"))?;
            segments.clear();
            segments.extend(remote_path.split('/').filter(|s| !s.is_empty()));
            if dir {
                segments.push("");
            }
        }
        Ok(url)
    }

    fn handle(&mut self) -> std::result::Result<&mut Easy, SessionError> {
        self.easy
            .as_mut()
            .ok_or_else(|| SessionError::transport(ErrorKind::Connection, "session closed"))
    }
}

fn curl_failure(op: &str, e: curl::Error) -> SessionError {
    SessionError::transport(classify_curl_error(&e), format!("{}: {}", op, e))
}

/// Parse an NLST body: one name per line, possibly prefixed with the directory.
pub fn parse_name_list(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter_map(|l| l.rsplit('/').next())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .collect()
}

impl RemoteSession for FtpsSession {
    fn list(&mut self, location: &str) -> std::result::Result<Vec<String>, SessionError> {
        let url = self.url_for(location, true)?;
        let easy = self.handle()?;
        let mut body = Vec::new();
        easy.url(url.as_str()).map_err(|e| curl_failure("list", e))?;
        easy.nobody(false).map_err(|e| curl_failure("list", e))?;
        easy.custom_request("NLST").map_err(|e| curl_failure("list", e))?;
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(|e| curl_failure("list", e))?;
            transfer.perform().map_err(|e| curl_failure("list", e))?;
        }
        Ok(parse_name_list(&body))
    }

    fn download(&mut self, remote_path: &str, sink: &mut PartFile) -> std::result::Result<u64, SessionError> {
        let url = self.url_for(remote_path, false)?;
        let easy = self.handle()?;
        let mut write_error: Option<MirrorError> = None;
        easy.url(url.as_str()).map_err(|e| curl_failure("download", e))?;
        // The NLST override only applies to directory URLs; file URLs still RETR.
        easy.nobody(false).map_err(|e| curl_failure("download", e))?;
        let result = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match sink.write_chunk(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        tracing::warn!("download write failed: {}", e);
                        write_error = Some(e);
                        Ok(0) // abort transfer
                    }
                })
                .map_err(|e| curl_failure("download", e))?;
            transfer.perform()
        };
        if let Some(e) = write_error {
            return Err(SessionError::Storage(e));
        }
        result.map_err(|e| curl_failure("download", e))?;
        Ok(sink.bytes_written())
    }

    fn is_connected(&self) -> bool {
        self.easy.is_some()
    }

    fn close(&mut self) -> anyhow::Result<()> {
        // Dropping the handle sends QUIT and closes the control connection.
        if self.easy.take().is_some() {
            tracing::debug!(url = %self.base, "ftps session closed");
        }
        Ok(())
    }
}
