//! Decoded `/server/info` and `/printer/info` answers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub klippy_connected: Option<bool>,
    pub klippy_state: Option<String>,
    pub moonraker_version: Option<String>,
    pub api_version_string: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterInfo {
    /// "ready", "startup", "shutdown" or "error".
    pub state: Option<String>,
    pub state_message: Option<String>,
    pub hostname: Option<String>,
    /// Klipper version.
    pub software_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_partial_printer_info() {
        let info: PrinterInfo = serde_json::from_value(serde_json::json!({
            "state": "ready",
            "software_version": "v0.12.0-100",
            "cpu_info": "4 core ARM"
        }))
        .unwrap();
        assert_eq!(info.state.as_deref(), Some("ready"));
        assert_eq!(info.hostname, None);
    }
}
