//! Registry record of one supervised connection.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::future::Shared;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use plcwatch_catalog::{Sanitizer, VariableCatalog};
use plcwatch_protocol::messages::ConnectionSummary;
use plcwatch_protocol::{
    BoxFuture, ConnectionConfig, ConnectionId, ConnectionStatus, RetryPolicy, TagSession,
    VariableDescriptor,
};

use crate::error::ConnectionError;
use crate::machine::StateMachine;
use crate::types::ConnectionEvent;

/// Outcome of a connect attempt, shared by every caller waiting on it.
pub(crate) type ConnectFuture = Shared<BoxFuture<'static, Result<(), ConnectionError>>>;

/// A supervised controller connection.
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub endpoint: String,
    pub namespace: Option<String>,
    pub namespace_index: u16,
    pub retry: RetryPolicy,
    pub created_at: DateTime<Utc>,
    pub(crate) machine: StateMachine,
    pub(crate) session: Mutex<Option<Arc<dyn TagSession>>>,
    /// Cancelled on disconnect; replaced on every new connect.
    pub(crate) session_token: Mutex<CancellationToken>,
    pub(crate) catalog: Mutex<VariableCatalog>,
    pub(crate) inflight: Mutex<Option<ConnectFuture>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        config: ConnectionConfig,
        sanitizer: Sanitizer,
        events_tx: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let id = ConnectionId::new();
        Self {
            id,
            name: config.name,
            endpoint: config.endpoint,
            namespace: config.namespace,
            namespace_index: config.namespace_index,
            retry: config.retry,
            created_at: Utc::now(),
            machine: StateMachine::new(id, events_tx),
            session: Mutex::new(None),
            session_token: Mutex::new(CancellationToken::new()),
            catalog: Mutex::new(VariableCatalog::new(config.variables, sanitizer)),
            inflight: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.machine.status()
    }

    /// The open session, if connected.
    pub fn session(&self) -> Option<Arc<dyn TagSession>> {
        lock(&self.session).clone()
    }

    /// Token of the current session; cancelled when it is torn down.
    pub fn session_token(&self) -> CancellationToken {
        lock(&self.session_token).clone()
    }

    /// Merged catalog entries.
    pub fn entries(&self) -> Vec<VariableDescriptor> {
        lock(&self.catalog).entries()
    }

    pub fn summary(&self) -> ConnectionSummary {
        let status = self.status();
        ConnectionSummary {
            id: self.id,
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            namespace: self.namespace.clone(),
            namespace_index: self.namespace_index,
            status,
            is_connected: status.is_connected(),
            variable_count: lock(&self.catalog).len(),
            created_at: self.created_at,
        }
    }
}

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
