use plcwatch_catalog::{ReadError, WriteError};
use plcwatch_protocol::{ConnectFailure, ConnectionId};

/// Errors for connection operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid connection configuration: {0}")]
    Configuration(String),

    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    #[error("connection {0} is not connected")]
    NotConnected(ConnectionId),

    #[error("connect failed: {0}")]
    Connect(ConnectFailure),

    #[error("connection {0} was disconnected while connecting")]
    Cancelled(ConnectionId),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl ConnectionError {
    /// Structured connect failure, if this is one.
    pub fn connect_failure(&self) -> Option<&ConnectFailure> {
        match self {
            Self::Connect(failure) => Some(failure),
            _ => None,
        }
    }
}
