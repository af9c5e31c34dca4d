//! G-code file records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A file stored on the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Moonraker reports this as `path`.
    #[serde(alias = "path")]
    pub filename: String,
    /// Bytes.
    #[serde(default)]
    pub size: u64,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub modified: f64,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
}

impl FileRecord {
    /// A record made up locally after an upload, with a duration estimated
    /// from the file size.
    pub fn synthesized(filename: impl Into<String>, size: u64, modified: f64) -> Self {
        Self {
            filename: filename.into(),
            size,
            modified,
            estimated_time: Some((size / 1000) as f64),
        }
    }
}

/// Decode a file listing, accepting either a bare array or `{"files": [...]}`.
/// Entries that do not decode are skipped; host order is preserved.
pub fn parse_file_list(value: &Value) -> Vec<FileRecord> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("files") {
            Some(Value::Array(entries)) => entries,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect()
}
