//! Public types for the connection manager.

use std::time::Duration;

use plcwatch_protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_OPERATION_TIMEOUT, DEFAULT_SESSION_TIMEOUT,
};
use plcwatch_protocol::{ConnectFailure, ConnectionId, ConnectionStatus};

/// Deadlines applied to collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connect plus session open, retries included.
    pub connect: Duration,
    /// A single browse, read, write or close.
    pub operation: Duration,
    /// Session lifetime requested from the controller.
    pub session: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            operation: DEFAULT_OPERATION_TIMEOUT,
            session: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connection's lifecycle status changed.
    StateChanged {
        connection_id: ConnectionId,
        status: ConnectionStatus,
        /// Set when the new status is `Failed`.
        failure: Option<ConnectFailure>,
    },
    /// A connection was added to the registry.
    Created { connection_id: ConnectionId },
    /// A connection was removed from the registry.
    Removed { connection_id: ConnectionId },
}

impl ConnectionEvent {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Self::StateChanged { connection_id, .. }
            | Self::Created { connection_id }
            | Self::Removed { connection_id } => *connection_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts() {
        let t = Timeouts::default();
        assert_eq!(t.connect, Duration::from_secs(10));
        assert_eq!(t.session, Duration::from_secs(120));
        assert!(t.operation < t.connect);
    }

    #[test]
    fn event_connection_id() {
        let id = ConnectionId::new();
        let event = ConnectionEvent::StateChanged {
            connection_id: id,
            status: ConnectionStatus::Connected,
            failure: None,
        };
        assert_eq!(event.connection_id(), id);
        assert_eq!(ConnectionEvent::Removed { connection_id: id }.connection_id(), id);
    }
}
