//! Connection parameters and port repair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default Moonraker port.
pub const DEFAULT_PORT: u16 = 7125;

/// The SSH port, a common misconfiguration for the Moonraker port.
pub const SSH_PORT: u16 = 22;

/// Lowest port accepted as a Moonraker service port.
const MIN_SERVICE_PORT: u16 = 1024;

/// Where to find the printer host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auto_connect: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auto_connect: false,
        }
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// The port actually used after repair.
    pub fn effective_port(&self) -> u16 {
        normalize_port(self.port).0
    }

    /// Whether the configured port needed repair.
    pub fn port_correction(&self) -> Option<PortCorrection> {
        normalize_port(self.port).1
    }
}

/// Why a configured port was replaced by [`DEFAULT_PORT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortCorrection {
    /// Port 22 was configured; that is SSH, not Moonraker.
    Ssh,
    /// The port is outside the accepted service range.
    OutOfRange(u16),
}

impl fmt::Display for PortCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortCorrection::Ssh => write!(
                f,
                "port {SSH_PORT} is SSH, using {DEFAULT_PORT} (Moonraker) instead"
            ),
            PortCorrection::OutOfRange(port) => write!(
                f,
                "port {port} is not a valid Moonraker port, using {DEFAULT_PORT} instead"
            ),
        }
    }
}

/// Repair a configured port, reporting what was changed.
pub fn normalize_port(port: u16) -> (u16, Option<PortCorrection>) {
    if port == SSH_PORT {
        (DEFAULT_PORT, Some(PortCorrection::Ssh))
    } else if port < MIN_SERVICE_PORT {
        (DEFAULT_PORT, Some(PortCorrection::OutOfRange(port)))
    } else {
        (port, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_port_is_repaired() {
        assert_eq!(normalize_port(22), (DEFAULT_PORT, Some(PortCorrection::Ssh)));
        let params = ConnectionParams::new("printer.local", 22);
        assert_eq!(params.effective_port(), 7125);
        assert_eq!(params.port_correction(), Some(PortCorrection::Ssh));
    }

    #[test]
    fn low_ports_are_repaired() {
        assert_eq!(
            normalize_port(80),
            (DEFAULT_PORT, Some(PortCorrection::OutOfRange(80)))
        );
        assert_eq!(
            normalize_port(0),
            (DEFAULT_PORT, Some(PortCorrection::OutOfRange(0)))
        );
    }

    #[test]
    fn service_ports_pass_through() {
        assert_eq!(normalize_port(7125), (7125, None));
        assert_eq!(normalize_port(8080), (8080, None));
        assert_eq!(normalize_port(65535), (65535, None));
    }

    #[test]
    fn port_defaults_when_missing() {
        let params: ConnectionParams = serde_json::from_str(r#"{"host":"10.0.0.5"}"#).unwrap();
        assert_eq!(params.port, DEFAULT_PORT);
        assert!(!params.auto_connect);
    }
}
