//! Failure taxonomy.
//!
//! Every error in the workspace maps onto one of these kinds. The transport
//! classifies from typed signals; [`ErrorKind::classify_message`] covers the
//! cases where only text is available (close reasons, proxied errors).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failure talking to the printer host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The host did not answer within the request deadline.
    Timeout,
    /// The host could not be reached at all.
    Network,
    /// The host answered but refused this client or origin.
    Cors,
    /// The host answered with a non-success status.
    Server(u16),
    /// The request was rejected locally (bad port, out-of-range value).
    Configuration,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Classify a free-form error message.
    pub fn classify_message(message: &str) -> Self {
        let m = message.to_lowercase();

        if m.contains("timeout") || m.contains("timed out") {
            return ErrorKind::Timeout;
        }
        if m.contains("cors") || m.contains("cross-origin") {
            return ErrorKind::Cors;
        }
        if m.contains("failed to fetch")
            || m.contains("network")
            || m.contains("connection")
            || m.contains("refused")
            || m.contains("unreachable")
        {
            return ErrorKind::Network;
        }
        for status in [500, 502, 503, 504] {
            if m.contains(&status.to_string()) {
                return ErrorKind::Server(status);
            }
        }
        ErrorKind::Unknown
    }

    /// Whether the host was reached (it produced some answer).
    pub fn host_answered(&self) -> bool {
        matches!(self, ErrorKind::Cors | ErrorKind::Server(_))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::Network => f.write_str("network error"),
            ErrorKind::Cors => f.write_str("cross-origin error"),
            ErrorKind::Server(status) => write!(f, "server error (HTTP {status})"),
            ErrorKind::Configuration => f.write_str("configuration error"),
            ErrorKind::Unknown => f.write_str("unknown error"),
        }
    }
}
