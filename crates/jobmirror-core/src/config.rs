use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::endpoint::{PrinterEndpoint, TlsPolicy};
use crate::retry::RetryPolicy;

/// Printer address and credentials. Every field is required at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub access_code: String,
    #[serde(default)]
    pub serial: String,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Local cache location. `None` means `$XDG_CACHE_HOME/jobmirror`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}

/// Remote file store (FTPS) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub port: u16,
    /// Directories searched, in order, when resolving a file name.
    pub locations: Vec<String>,
    pub connect_timeout_secs: u64,
    /// Upper bound for one listing or download.
    pub transfer_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            port: 990,
            locations: vec!["/".to_string(), "/model".to_string()],
            connect_timeout_secs: 15,
            transfer_timeout_secs: 600,
        }
    }
}

/// Telemetry stream (MQTT) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub port: u16,
    pub connect_timeout_secs: u64,
    /// Delay between the transport accepting the session and the connected check.
    pub settle_millis: u64,
    pub keep_alive_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            port: 8883,
            connect_timeout_secs: 10,
            settle_millis: 1500,
            keep_alive_secs: 30,
        }
    }
}

/// Certificate trust for both printer transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Printers ship self-signed certificates; turning this off requires a
    /// device whose certificate chains to a trusted root.
    pub accept_self_signed: bool,
    /// PEM bundle trusted when `accept_self_signed` is off.
    pub ca_file: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            accept_self_signed: true,
            ca_file: None,
        }
    }
}

/// Reconnect backoff for the telemetry stream (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before the delay stops growing.
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_secs: 1.0,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    /// Fails on a base delay that is not a representable duration (`inf`, huge).
    pub fn to_policy(&self) -> std::result::Result<RetryPolicy, ConfigError> {
        let base_delay = Duration::try_from_secs_f64(self.base_delay_secs.max(0.0)).map_err(|_| {
            ConfigError::Invalid {
                key: "retry.base_delay_secs",
                value: self.base_delay_secs.to_string(),
            }
        })?;
        Ok(RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(self.max_delay_secs),
        })
    }
}

/// Global configuration loaded from `~/.config/jobmirror/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Optional reconnect policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

/// Raised when a value required to start is missing or malformed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl MirrorConfig {
    /// Build the printer endpoint, failing on any empty required field.
    pub fn endpoint(&self) -> std::result::Result<PrinterEndpoint, ConfigError> {
        let p = &self.printer;
        let host = require("printer.host", &p.host)?;
        let access_code = require("printer.access_code", &p.access_code)?;
        let serial = require("printer.serial", &p.serial)?;
        Ok(PrinterEndpoint::new(host, access_code, serial))
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        TlsPolicy {
            accept_self_signed: self.tls.accept_self_signed,
        }
    }

    /// Reject trust settings that cannot produce a working TLS client.
    pub fn validate_tls(&self) -> std::result::Result<(), ConfigError> {
        if !self.tls.accept_self_signed && self.tls.ca_file.is_none() {
            return Err(ConfigError::Missing("tls.ca_file"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> std::result::Result<RetryPolicy, ConfigError> {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    /// Resolve the cache directory, falling back to the XDG cache home.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix("jobmirror")?;
                Ok(xdg_dirs.get_cache_home().join("jobmirror"))
            }
        }
    }

    /// Apply `JOBMIRROR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("JOBMIRROR_HOST") {
            self.printer.host = v;
        }
        if let Some(v) = lookup("JOBMIRROR_ACCESS_CODE") {
            self.printer.access_code = v;
        }
        if let Some(v) = lookup("JOBMIRROR_SERIAL") {
            self.printer.serial = v;
        }
        if let Some(v) = lookup("JOBMIRROR_PORT") {
            self.server.port = v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "JOBMIRROR_PORT",
                value: v.clone(),
            })?;
        }
        Ok(())
    }
}

fn require(key: &'static str, value: &str) -> std::result::Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    Ok(trimmed.to_string())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("jobmirror")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from the default location, creating a template if none exists.
pub fn load_or_init() -> Result<MirrorConfig> {
    load_or_init_at(&config_path()?)
}

/// Load configuration from `path`, creating a template there if it is missing.
/// The template leaves the printer section empty, so startup still fails until
/// it is filled in (or supplied through the environment).
pub fn load_or_init_at(path: &Path) -> Result<MirrorConfig> {
    if !path.exists() {
        let default_cfg = MirrorConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)
            .with_context(|| format!("failed to write config template {}", path.display()))?;
        tracing::info!("created config template at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: MirrorConfig =
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}
