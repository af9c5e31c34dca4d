use klipperdeck_client::TransportError;
use klipperdeck_core::{CommandError, ErrorKind};

/// Why a session operation was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("not connected to a printer")]
    NotConnected,

    #[error("connection attempt cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Command(e) => e.kind(),
            SessionError::Transport(e) => e.kind(),
            SessionError::NotConnected => ErrorKind::Configuration,
            SessionError::Cancelled => ErrorKind::Unknown,
        }
    }
}
