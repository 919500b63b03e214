//! Latest telemetry values, shared between the message loop and readers.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

/// Latest known job fields. `None` means "not observed yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub active_file_name: Option<String>,
    pub layer_count: Option<u32>,
}

/// Fields extracted from one status report. Each present field overwrites
/// the snapshot; absent fields leave it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportUpdate {
    pub active_file_name: Option<String>,
    pub layer_count: Option<u32>,
}

impl ReportUpdate {
    pub fn is_empty(&self) -> bool {
        self.active_file_name.is_none() && self.layer_count.is_none()
    }
}

/// Cloneable handle to the shared snapshot. Written by the tracker only.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle(Arc<RwLock<TelemetrySnapshot>>);

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> TelemetrySnapshot {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn active_file_name(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_file_name
            .clone()
    }

    pub fn layer_count(&self) -> Option<u32> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).layer_count
    }

    /// Last write wins per field.
    pub fn apply(&self, update: ReportUpdate) {
        if update.is_empty() {
            return;
        }
        let mut snap = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(name) = update.active_file_name {
            if snap.active_file_name.as_deref() != Some(name.as_str()) {
                tracing::info!(file = %name, "active file changed");
            }
            snap.active_file_name = Some(name);
        }
        if let Some(layers) = update.layer_count {
            snap.layer_count = Some(layers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_update_independently() {
        let h = SnapshotHandle::new();
        assert_eq!(h.read(), TelemetrySnapshot::default());

        h.apply(ReportUpdate {
            active_file_name: Some("cube.gcode".into()),
            layer_count: None,
        });
        h.apply(ReportUpdate {
            active_file_name: None,
            layer_count: Some(120),
        });
        assert_eq!(h.active_file_name().as_deref(), Some("cube.gcode"));
        assert_eq!(h.layer_count(), Some(120));

        h.apply(ReportUpdate::default());
        assert_eq!(h.active_file_name().as_deref(), Some("cube.gcode"));
        assert_eq!(h.layer_count(), Some(120));
    }

    #[test]
    fn serializes_camel_case_with_nulls() {
        let json = serde_json::to_value(TelemetrySnapshot::default()).unwrap();
        assert_eq!(json, serde_json::json!({"activeFileName": null, "layerCount": null}));
    }
}
