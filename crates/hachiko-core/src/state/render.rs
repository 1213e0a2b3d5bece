//! Metadata rendering for progress annotations
//!
//! Values are pretty-printed for the human reading the tracking record:
//! URLs become links, booleans become Yes/No, numbers are stringified, and
//! everything else is JSON-encoded.

use crate::types::ProgressMetadata;
use serde_json::Value;

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Render one metadata value.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if is_url(s) => format!("[{s}]({s})"),
        other => other.to_string(),
    }
}

/// Render a metadata map into an annotation body, one `key: value` line per
/// entry, in key order.
#[must_use]
pub fn render_metadata(metadata: &ProgressMetadata) -> String {
    metadata
        .iter()
        .map(|(key, value)| format!("{key}: {}", render_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}
