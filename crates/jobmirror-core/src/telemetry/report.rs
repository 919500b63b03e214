//! Status report parsing and the initialization request.

use serde_json::{json, Value};

use super::snapshot::ReportUpdate;

/// Parse one inbound payload. Only the `print` section is inspected:
/// `gcode_file` is the active file, `total_layer_num` the layer count.
pub fn parse_report(payload: &[u8]) -> Result<ReportUpdate, serde_json::Error> {
    let value: Value = serde_json::from_slice(payload)?;
    let Some(print) = value.get("print") else {
        return Ok(ReportUpdate::default());
    };

    let active_file_name = print
        .get("gcode_file")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let layer_count = print
        .get("total_layer_num")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    Ok(ReportUpdate {
        active_file_name,
        layer_count,
    })
}

/// Request bundle that makes the device publish a full status report
/// (plus firmware info and print history) instead of waiting for the next
/// periodic delta.
pub fn init_request(sequence_id: u64) -> Vec<u8> {
    let seq = sequence_id.to_string();
    json!({
        "pushing": { "sequence_id": seq, "command": "pushall", "version": 1, "push_target": 1 },
        "info": { "sequence_id": seq, "command": "get_version" },
        "upgrade": { "sequence_id": seq, "command": "get_history" },
    })
    .to_string()
    .into_bytes()
}
