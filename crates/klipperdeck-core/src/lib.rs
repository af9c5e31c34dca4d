//! Core types for klipperdeck.
//!
//! This crate holds the pieces every other crate agrees on: connection
//! parameters, the printer profile, the telemetry snapshot, file records, the
//! failure taxonomy and the G-code encoder. It performs no I/O.

mod error;
mod files;
pub mod gcode;
mod params;
mod profile;
mod snapshot;
pub mod subsystems;

pub use error::ErrorKind;
pub use files::{FileRecord, parse_file_list};
pub use gcode::{CommandError, Encoded, PrinterCommand, encode};
pub use params::{ConnectionParams, DEFAULT_PORT, PortCorrection, SSH_PORT, normalize_port};
pub use profile::{
    Axis, AxisLimits, ExtruderLimits, HotendLimits, PrinterProfile, ProfileError, Speeds,
    TemperatureRange, TravelRange,
};
pub use snapshot::{Record, Snapshot};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No client link and no simulation.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting { attempt: u32 },
    /// Live link to the printer host.
    Connected,
    /// Backed by the local simulator.
    Simulated,
    /// Last attempt or the live link failed.
    Failed { kind: ErrorKind, message: String },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, SessionState::Simulated)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, SessionState::Connecting { .. })
    }

    /// Short tag for display ("connected", "connecting", ...).
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting { .. } => "connecting",
            SessionState::Connected => "connected",
            SessionState::Simulated => "simulated",
            SessionState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            SessionState::Failed { message, .. } => write!(f, "failed: {message}"),
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(SessionState::Connecting { attempt: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "connecting", "attempt": 2}));
    }

    #[test]
    fn failed_state_display_shows_message_once() {
        let state = SessionState::Failed {
            kind: ErrorKind::Network,
            message: "network error: cannot reach http://fake:7125: refused".into(),
        };
        assert_eq!(
            state.to_string(),
            "failed: network error: cannot reach http://fake:7125: refused"
        );
        assert!(!state.is_connected());
    }
}
