//! Read-side API for external callers.
//!
//! Everything here is transport-neutral; the HTTP layer only serializes the
//! views and maps `QueryError::status_code`.

use std::sync::Arc;

use serde::Serialize;

use crate::coordinator::FetchCoordinator;
use crate::error::MirrorError;
use crate::telemetry::{LinkStatus, SnapshotHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNameView {
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerCountView {
    pub layer_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthView {
    pub telemetry: &'static str,
    pub remote: &'static str,
}

/// Open cached content of the active file.
#[derive(Debug)]
pub struct FileContent {
    pub name: String,
    pub len: u64,
    pub file: tokio::fs::File,
}

/// Failures surfaced to callers. Messages carry no internal detail.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no active file reported yet")]
    NoActiveFile,
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("internal error")]
    Internal,
}

impl QueryError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::NoActiveFile => 400,
            QueryError::NotFound(_) => 404,
            QueryError::Internal => 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuerySurface {
    snapshot: SnapshotHandle,
    telemetry: LinkStatus,
    coordinator: Arc<FetchCoordinator>,
}

impl QuerySurface {
    pub fn new(snapshot: SnapshotHandle, telemetry: LinkStatus, coordinator: Arc<FetchCoordinator>) -> Self {
        Self {
            snapshot,
            telemetry,
            coordinator,
        }
    }

    pub fn file_name(&self) -> FileNameView {
        FileNameView {
            file_name: self.snapshot.active_file_name(),
        }
    }

    pub fn layer_count(&self) -> LayerCountView {
        LayerCountView {
            layer_count: self.snapshot.layer_count(),
        }
    }

    pub fn health(&self) -> HealthView {
        HealthView {
            telemetry: self.telemetry.get().as_str(),
            remote: self.coordinator.remote_status().get().as_str(),
        }
    }

    /// Cached content of the active file, fetching it on first request.
    pub async fn active_file(&self) -> Result<FileContent, QueryError> {
        let name = self.snapshot.active_file_name().ok_or(QueryError::NoActiveFile)?;

        let cached = match self.coordinator.get_file(&name).await {
            Ok(Some(cached)) => cached,
            Ok(None) => return Err(QueryError::NotFound(name)),
            Err(e) => return Err(classify(&name, e)),
        };

        let file = self
            .coordinator
            .store()
            .open(&cached.key)
            .await
            .map_err(|e| classify(&name, e))?;
        let len = file
            .metadata()
            .await
            .map(|m| m.len())
            .map_err(|e| classify(&name, MirrorError::storage("stat", &cached.path, e)))?;

        Ok(FileContent { name, len, file })
    }
}

fn classify(name: &str, err: MirrorError) -> QueryError {
    match err {
        MirrorError::Storage { .. } => {
            tracing::error!(name, "serving file failed: {}", err);
            QueryError::Internal
        }
        other => {
            tracing::warn!(name, "file unavailable: {}", other);
            QueryError::NotFound(name.to_string())
        }
    }
}
