//! Connection lifecycle state machine.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use plcwatch_protocol::{ConnectFailure, ConnectionId, ConnectionStatus};

use crate::types::ConnectionEvent;

/// Owns one connection's status.
///
/// Every change goes through [`transition`](Self::transition) or
/// [`transition_from`](Self::transition_from), which enforce
/// [`ConnectionStatus::can_transition_to`] and emit
/// [`ConnectionEvent::StateChanged`].
#[derive(Debug)]
pub struct StateMachine {
    id: ConnectionId,
    status: Mutex<ConnectionStatus>,
    events_tx: mpsc::Sender<ConnectionEvent>,
}

impl StateMachine {
    pub fn new(id: ConnectionId, events_tx: mpsc::Sender<ConnectionEvent>) -> Self {
        Self {
            id,
            status: Mutex::new(ConnectionStatus::Disconnected),
            events_tx,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.lock()
    }

    /// Moves to `next`. Returns `false` if the table forbids it.
    ///
    /// Re-entering `Disconnected` is accepted silently.
    pub fn transition(&self, next: ConnectionStatus, failure: Option<ConnectFailure>) -> bool {
        let mut status = self.lock();
        self.apply(&mut status, next, failure)
    }

    /// Moves to `next` only if the current status is `expected`.
    pub fn transition_from(
        &self,
        expected: ConnectionStatus,
        next: ConnectionStatus,
        failure: Option<ConnectFailure>,
    ) -> bool {
        let mut status = self.lock();
        let current = *status;
        if current != expected {
            debug!(
                connection = %self.id,
                %current,
                %expected,
                %next,
                "transition skipped"
            );
            return false;
        }
        self.apply(&mut status, next, failure)
    }

    fn apply(
        &self,
        status: &mut ConnectionStatus,
        next: ConnectionStatus,
        failure: Option<ConnectFailure>,
    ) -> bool {
        let current = *status;
        if current == next && next == ConnectionStatus::Disconnected {
            return true;
        }
        if !current.can_transition_to(next) {
            warn!(connection = %self.id, from = %current, to = %next, "transition rejected");
            return false;
        }

        *status = next;
        debug!(connection = %self.id, from = %current, to = %next, "status changed");
        let event = ConnectionEvent::StateChanged {
            connection_id: self.id,
            status: next,
            failure,
        };
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(connection = %self.id, error = %e, "status event dropped");
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcwatch_protocol::FailureCategory;

    fn machine() -> (StateMachine, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (StateMachine::new(ConnectionId::new(), tx), rx)
    }

    #[test]
    fn happy_path_emits_events() {
        let (m, mut rx) = machine();
        assert_eq!(m.status(), ConnectionStatus::Disconnected);
        assert!(m.transition(ConnectionStatus::Connecting, None));
        assert!(m.transition(ConnectionStatus::Connected, None));
        assert!(m.transition(ConnectionStatus::Disconnected, None));

        let statuses: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                ConnectionEvent::StateChanged { status, .. } => status,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let (m, mut rx) = machine();
        assert!(!m.transition(ConnectionStatus::Connected, None));
        assert_eq!(m.status(), ConnectionStatus::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failure_is_attached_to_event() {
        let id = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(16);
        let m = StateMachine::new(id, tx);
        m.transition(ConnectionStatus::Connecting, None);
        let failure = ConnectFailure::new(FailureCategory::Timeout, "timed out");
        assert!(m.transition(ConnectionStatus::Failed, Some(failure.clone())));
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last();
        assert_eq!(
            last,
            Some(ConnectionEvent::StateChanged {
                connection_id: id,
                status: ConnectionStatus::Failed,
                failure: Some(failure),
            })
        );
        // Retry from Failed is allowed.
        assert!(m.transition(ConnectionStatus::Connecting, None));
    }

    #[test]
    fn transition_from_checks_current_status() {
        let (m, _rx) = machine();
        m.transition(ConnectionStatus::Connecting, None);
        m.transition(ConnectionStatus::Disconnected, None);
        assert!(!m.transition_from(
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            None
        ));
        assert_eq!(m.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn repeated_disconnect_is_silent() {
        let (m, mut rx) = machine();
        assert!(m.transition(ConnectionStatus::Disconnected, None));
        assert!(rx.try_recv().is_err());
    }
}
