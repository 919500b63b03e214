//! Process logging for the mirror: an append-only file under the XDG state
//! dir, or stderr when running under a supervisor that captures it.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Filter override, checked before `RUST_LOG`.
pub const FILTER_ENV: &str = "JOBMIRROR_LOG";

/// Our crates at debug; the MQTT client logs every ping at debug, so it is
/// held to warnings unless asked for.
const DEFAULT_FILTER: &str = "info,jobmirror_core=debug,jobmirror_cli=debug,rumqttc=warn";

/// Resolve the filter from `JOBMIRROR_LOG`, then `RUST_LOG`, then the default.
/// An unparsable value falls through to the next source.
fn env_filter_from(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    [FILTER_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(|var| lookup(var))
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn env_filter() -> EnvFilter {
    env_filter_from(|var| std::env::var(var).ok())
}

/// Path of the log file: `$XDG_STATE_HOME/jobmirror/jobmirror.log`.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("jobmirror")?;
    Ok(xdg_dirs.get_state_home().join("jobmirror").join("jobmirror.log"))
}

/// Start logging to the state-dir log file and return its path.
/// Errors leave no subscriber installed, so the caller can fall back to
/// `init_logging_stderr`.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber: {}", e))?;

    tracing::info!(path = %path.display(), "jobmirror logging started");
    Ok(path)
}

/// Log to stderr instead of the state file.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
