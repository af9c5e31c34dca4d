//! Transport errors.

use klipperdeck_core::ErrorKind;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

/// A failed call to the printer host.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("timeout: {url} did not answer within {}ms", .after.as_millis())]
    Timeout { url: String, after: Duration },

    #[error("network error: cannot reach {url}: {message}")]
    Network { url: String, message: String },

    #[error("cross-origin error: {url} refused this client, check cors_domains and trusted_clients in moonraker.conf")]
    Cors { url: String },

    #[error("HTTP {status} from {url}: {message}")]
    Server {
        url: String,
        status: u16,
        message: String,
    },

    #[error("{0}")]
    Unknown(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            TransportError::Network { .. } => ErrorKind::Network,
            TransportError::Cors { .. } => ErrorKind::Cors,
            TransportError::Server { status, .. } => ErrorKind::Server(*status),
            TransportError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Build from a non-success HTTP status. 403 means the host refused this
    /// client or origin.
    pub fn from_status(url: &str, status: u16, message: impl Into<String>) -> Self {
        if status == 403 {
            TransportError::Cors {
                url: url.to_string(),
            }
        } else {
            TransportError::Server {
                url: url.to_string(),
                status,
                message: message.into(),
            }
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error, after: Duration) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout {
                url: url.to_string(),
                after,
            };
        }
        if let Some(status) = err.status() {
            return Self::from_status(url, status.as_u16(), err.to_string());
        }
        if err.is_connect() || err.is_request() {
            return TransportError::Network {
                url: url.to_string(),
                message: err.to_string(),
            };
        }
        Self::from_message(url, err.to_string())
    }

    pub(crate) fn from_ws(url: &str, err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                let status = response.status();
                Self::from_status(
                    url,
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("upgrade rejected"),
                )
            }
            tungstenite::Error::Io(io) => TransportError::Network {
                url: url.to_string(),
                message: io.to_string(),
            },
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Network {
                    url: url.to_string(),
                    message: "connection closed".to_string(),
                }
            }
            other => Self::from_message(url, other.to_string()),
        }
    }

    /// Classify from text alone.
    pub(crate) fn from_message(url: &str, message: String) -> Self {
        match ErrorKind::classify_message(&message) {
            ErrorKind::Timeout => TransportError::Timeout {
                url: url.to_string(),
                after: Duration::ZERO,
            },
            ErrorKind::Network => TransportError::Network {
                url: url.to_string(),
                message,
            },
            ErrorKind::Cors => TransportError::Cors {
                url: url.to_string(),
            },
            ErrorKind::Server(status) => TransportError::Server {
                url: url.to_string(),
                status,
                message,
            },
            ErrorKind::Configuration | ErrorKind::Unknown => TransportError::Unknown(message),
        }
    }
}
