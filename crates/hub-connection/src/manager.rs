//! Connection registry driving the lifecycle state machine.
//!
//! Owns every supervised connection, opens and closes sessions through the
//! [`TagClient`] collaborator, and runs discovery, reads and writes against
//! the open sessions.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plcwatch_catalog::{Sanitizer, read_variable, write_variable};
use plcwatch_discovery::{Explorer, ExplorerConfig};
use plcwatch_protocol::messages::{BrowseOutcome, ConnectionSummary, EndpointReport, ScanReport, VariableReading};
use plcwatch_protocol::{
    ConnectOptions, ConnectionConfig, ConnectionId, ConnectionStatus, DataType, DeclaredVariable,
    NodeId, Provenance, StatusCode, TagClient, TagSession, TransportError, VariableDescriptor,
};

use crate::classify::connect_failure;
use crate::connection::{Connection, lock};
use crate::error::ConnectionError;
use crate::tester;
use crate::types::{ConnectionEvent, Timeouts};

/// Registry of supervised connections.
pub struct ConnectionManager {
    client: Arc<dyn TagClient>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    explorer: Explorer,
    sanitizer: Sanitizer,
    timeouts: Timeouts,
    events_tx: mpsc::Sender<ConnectionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Creates an empty registry using `client` to reach controllers.
    pub fn new(client: Arc<dyn TagClient>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            client,
            connections: RwLock::new(HashMap::new()),
            explorer: Explorer::default(),
            sanitizer: Sanitizer::default(),
            timeouts: Timeouts::default(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_explorer(mut self, config: ExplorerConfig) -> Self {
        self.explorer = Explorer::new(config);
        self
    }

    /// Sanitizer given to catalogs of connections created afterwards.
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Registers a new connection in `Disconnected` state.
    pub async fn create(&self, config: ConnectionConfig) -> Result<ConnectionId, ConnectionError> {
        if config.name.trim().is_empty() {
            return Err(ConnectionError::Configuration("name is required".into()));
        }
        if config.endpoint.trim().is_empty() {
            return Err(ConnectionError::Configuration("endpoint is required".into()));
        }

        let conn = Arc::new(Connection::new(
            config,
            self.sanitizer.clone(),
            self.events_tx.clone(),
        ));
        let id = conn.id;
        info!(connection = %id, name = %conn.name, endpoint = %conn.endpoint, "connection created");
        self.connections.write().await.insert(id, conn);
        self.emit(ConnectionEvent::Created { connection_id: id });
        Ok(id)
    }

    /// Looks up a connection.
    pub async fn get(&self, id: ConnectionId) -> Result<Arc<Connection>, ConnectionError> {
        self.connections
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ConnectionError::NotFound(id))
    }

    pub async fn status(&self, id: ConnectionId) -> Result<ConnectionStatus, ConnectionError> {
        Ok(self.get(id).await?.status())
    }

    /// Summaries of every connection, oldest first.
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<ConnectionSummary> = self
            .connections
            .read()
            .await
            .values()
            .map(|c| c.summary())
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().copied().collect()
    }

    /// Connects, or joins the connect already in flight.
    ///
    /// Succeeds immediately when already connected. Concurrent callers share
    /// one physical connect attempt.
    pub async fn connect(&self, id: ConnectionId) -> Result<(), ConnectionError> {
        let conn = self.get(id).await?;

        let attempt = {
            let mut inflight = lock(&conn.inflight);
            if let Some(attempt) = inflight.as_ref() {
                attempt.clone()
            } else {
                if conn.status() == ConnectionStatus::Connected {
                    return Ok(());
                }
                if !conn.machine.transition(ConnectionStatus::Connecting, None) {
                    return Err(ConnectionError::Connect(connect_failure(
                        &TransportError::InvalidState(format!("cannot connect from {}", conn.status())),
                    )));
                }

                let token = CancellationToken::new();
                *lock(&conn.session_token) = token.clone();

                let task = tokio::spawn(run_connect(
                    Arc::clone(&self.client),
                    Arc::clone(&conn),
                    token,
                    self.timeouts,
                ));
                let attempt = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(ConnectionError::Connect(connect_failure(
                            &TransportError::Other(format!("connect task failed: {e}")),
                        ))),
                    }
                }
                .boxed()
                .shared();
                *inflight = Some(attempt.clone());
                attempt
            }
        };

        attempt.await
    }

    /// Tears down the session. Safe in any state.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), ConnectionError> {
        let conn = self.get(id).await?;
        self.teardown(&conn).await;
        Ok(())
    }

    /// Disconnects if needed and removes the connection.
    pub async fn delete(&self, id: ConnectionId) -> Result<(), ConnectionError> {
        let conn = self
            .connections
            .write()
            .await
            .remove(&id)
            .ok_or(ConnectionError::NotFound(id))?;
        self.teardown(&conn).await;
        info!(connection = %id, "connection deleted");
        self.emit(ConnectionEvent::Removed { connection_id: id });
        Ok(())
    }

    /// Disconnects every connection.
    pub async fn disconnect_all(&self) {
        let conns: Vec<Arc<Connection>> = self.connections.read().await.values().cloned().collect();
        join_all(conns.iter().map(|c| self.teardown(c))).await;
        info!(count = conns.len(), "all connections disconnected");
    }

    /// Explores the address space and refreshes the catalog.
    ///
    /// Returns the merged catalog with current values for declared entries
    /// plus any subtrees that could not be explored.
    pub async fn browse_variables(&self, id: ConnectionId) -> Result<BrowseOutcome, ConnectionError> {
        let conn = self.get(id).await?;
        let session = conn.session().ok_or(ConnectionError::NotConnected(id))?;
        let token = conn.session_token();

        let report = self
            .explorer
            .explore(session.as_ref(), conn.namespace_index, self.timeouts.operation, &token)
            .await;
        if !report.failures.is_empty() {
            warn!(connection = %id, failures = report.failures.len(), "discovery incomplete");
        }

        let entries = {
            let mut catalog = lock(&conn.catalog);
            catalog.set_discovered(report.variables);
            catalog.entries()
        };
        let variables = self.fill_declared(session.as_ref(), entries, &token).await;
        info!(connection = %id, variables = variables.len(), "variables browsed");

        Ok(BrowseOutcome {
            variables,
            partial_failures: report.failures,
        })
    }

    /// Reads declared entries, which carry no value from discovery.
    async fn fill_declared(
        &self,
        session: &dyn TagSession,
        entries: Vec<VariableDescriptor>,
        token: &CancellationToken,
    ) -> Vec<VariableDescriptor> {
        let timeout = self.timeouts.operation;
        join_all(entries.into_iter().map(|mut entry| async move {
            if entry.provenance != Provenance::Declared {
                return entry;
            }
            let result = tokio::select! {
                _ = token.cancelled() => Err(TransportError::Cancelled.to_string()),
                r = read_variable(session, &entry.node_id, timeout) => r.map_err(|e| e.to_string()),
            };
            match result {
                Ok(reading) => {
                    entry.data_type = reading.data_type;
                    entry.value = reading.value;
                }
                Err(e) => {
                    entry.data_type = DataType::Unknown;
                    entry.error = Some(e);
                }
            }
            entry
        }))
        .await
    }

    /// Reads one variable.
    pub async fn read(&self, id: ConnectionId, node: &NodeId) -> Result<VariableReading, ConnectionError> {
        let conn = self.get(id).await?;
        let session = conn.session().ok_or(ConnectionError::NotConnected(id))?;
        let token = conn.session_token();
        tokio::select! {
            _ = token.cancelled() => Err(ConnectionError::NotConnected(id)),
            r = read_variable(session.as_ref(), node, self.timeouts.operation) => Ok(r?),
        }
    }

    /// Coerces and writes one variable.
    pub async fn write(
        &self,
        id: ConnectionId,
        node: &NodeId,
        raw: &serde_json::Value,
        data_type: DataType,
    ) -> Result<StatusCode, ConnectionError> {
        let conn = self.get(id).await?;
        let session = conn.session().ok_or(ConnectionError::NotConnected(id))?;
        let token = conn.session_token();
        let status = tokio::select! {
            _ = token.cancelled() => return Err(ConnectionError::NotConnected(id)),
            r = write_variable(session.as_ref(), node, raw, data_type, self.timeouts.operation) => r?,
        };
        info!(connection = %id, node = %node, %data_type, "variable written");
        Ok(status)
    }

    /// Adds or replaces a declared variable. Returns `true` if it was new.
    pub async fn add_variable(
        &self,
        id: ConnectionId,
        variable: DeclaredVariable,
    ) -> Result<bool, ConnectionError> {
        let conn = self.get(id).await?;
        debug!(connection = %id, node = %variable.node_id, "declaring variable");
        Ok(lock(&conn.catalog).add_declared(variable))
    }

    /// Removes a declared variable. Returns `true` if it existed.
    pub async fn remove_variable(&self, id: ConnectionId, node: &NodeId) -> Result<bool, ConnectionError> {
        let conn = self.get(id).await?;
        debug!(connection = %id, node = %node, "removing declared variable");
        Ok(lock(&conn.catalog).remove_declared(node))
    }

    /// Merged catalog of a connection.
    pub async fn entries(&self, id: ConnectionId) -> Result<Vec<VariableDescriptor>, ConnectionError> {
        Ok(self.get(id).await?.entries())
    }

    /// Session and token of a connected connection.
    pub async fn session(
        &self,
        id: ConnectionId,
    ) -> Result<(Arc<dyn TagSession>, CancellationToken), ConnectionError> {
        let conn = self.get(id).await?;
        let session = conn.session().ok_or(ConnectionError::NotConnected(id))?;
        Ok((session, conn.session_token()))
    }

    pub async fn test_endpoint(&self, endpoint: &str) -> EndpointReport {
        tester::test_endpoint(self.client.as_ref(), endpoint, self.timeouts).await
    }

    pub async fn scan_endpoints(&self, base_url: &str, ports: &[u16]) -> ScanReport {
        tester::scan_endpoints(self.client.as_ref(), base_url, ports, self.timeouts).await
    }

    async fn teardown(&self, conn: &Connection) {
        conn.session_token().cancel();
        let session = lock(&conn.session).take();
        if let Some(session) = session {
            match tokio::time::timeout(self.timeouts.operation, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(connection = %conn.id, error = %e, "session close failed"),
                Err(_) => warn!(connection = %conn.id, "session close timed out"),
            }
        }
        if conn.status() != ConnectionStatus::Disconnected {
            info!(connection = %conn.id, "disconnected");
        }
        conn.machine.transition(ConnectionStatus::Disconnected, None);
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "connection event dropped");
        }
    }
}

/// One physical connect attempt, run in its own task.
async fn run_connect(
    client: Arc<dyn TagClient>,
    conn: Arc<Connection>,
    token: CancellationToken,
    timeouts: Timeouts,
) -> Result<(), ConnectionError> {
    let result = open_session(client.as_ref(), &conn, &token, timeouts).await;
    *lock(&conn.inflight) = None;
    result
}

async fn open_session(
    client: &dyn TagClient,
    conn: &Connection,
    token: &CancellationToken,
    timeouts: Timeouts,
) -> Result<(), ConnectionError> {
    let options = ConnectOptions {
        retry: conn.retry.clone(),
        session_timeout: timeouts.session,
    };
    info!(connection = %conn.id, endpoint = %conn.endpoint, "connecting");

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!(connection = %conn.id, "connect abandoned");
            return Err(ConnectionError::Cancelled(conn.id));
        }
        r = tokio::time::timeout(timeouts.connect, client.connect(&conn.endpoint, &options)) => {
            r.unwrap_or(Err(TransportError::Timeout))
        }
    };

    let session = match result {
        Ok(session) => session,
        Err(e) => {
            let failure = connect_failure(&e);
            warn!(
                connection = %conn.id,
                endpoint = %conn.endpoint,
                category = %failure.category,
                error = %e,
                "connect failed"
            );
            conn.machine.transition_from(
                ConnectionStatus::Connecting,
                ConnectionStatus::Failed,
                Some(failure.clone()),
            );
            return Err(ConnectionError::Connect(failure));
        }
    };

    let stored = {
        let mut slot = lock(&conn.session);
        if !token.is_cancelled()
            && conn
                .machine
                .transition_from(ConnectionStatus::Connecting, ConnectionStatus::Connected, None)
        {
            *slot = Some(Arc::clone(&session));
            true
        } else {
            false
        }
    };

    if !stored {
        // A disconnect won the race; drop the fresh session.
        debug!(connection = %conn.id, "closing session opened after disconnect");
        match tokio::time::timeout(timeouts.operation, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(connection = %conn.id, error = %e, "late session close failed"),
            Err(_) => warn!(connection = %conn.id, "late session close timed out"),
        }
        return Err(ConnectionError::Cancelled(conn.id));
    }

    info!(connection = %conn.id, "connected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use plcwatch_protocol::{FailureCategory, RetryPolicy, Variant};
    use plcwatch_sim::{SimClient, SimServer};
    use serde_json::json;

    const ENDPOINT: &str = "opc.tcp://plc:4840";

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            retry: RetryPolicy::none(),
            ..ConnectionConfig::new("line 1", ENDPOINT)
        }
    }

    fn setup() -> (Arc<SimClient>, Arc<SimServer>, ConnectionManager) {
        let client = Arc::new(SimClient::new());
        let server = Arc::new(SimServer::demo());
        client.register(ENDPOINT, Arc::clone(&server));
        let mgr = ConnectionManager::new(client.clone());
        (client, server, mgr)
    }

    #[tokio::test]
    async fn create_requires_name_and_endpoint() {
        let (_, _, mgr) = setup();
        let err = mgr.create(ConnectionConfig::new("", ENDPOINT)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Configuration(_)));
        let err = mgr.create(ConnectionConfig::new("x", " ")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Configuration(_)));
        assert!(mgr.list().await.is_empty());
    }

    #[tokio::test]
    async fn create_lists_disconnected_summary() {
        let (_, _, mgr) = setup();
        let mut cfg = config();
        cfg.variables.push(DeclaredVariable {
            name: "Power".into(),
            node_id: NodeId::string(1, "main.power_on"),
            description: String::new(),
        });
        let id = mgr.create(cfg).await.unwrap();

        let list = mgr.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, id);
        assert_eq!(list[0].status, ConnectionStatus::Disconnected);
        assert!(!list[0].is_connected);
        assert_eq!(list[0].variable_count, 1);
        assert_eq!(list[0].namespace_index, 1);
    }

    #[tokio::test]
    async fn take_events_once() {
        let (_, _, mgr) = setup();
        assert!(mgr.take_events().await.is_some());
        assert!(mgr.take_events().await.is_none());
    }

    #[tokio::test]
    async fn connect_and_disconnect() {
        let (client, _, mgr) = setup();
        let mut events = mgr.take_events().await.unwrap();
        let id = mgr.create(config()).await.unwrap();

        mgr.connect(id).await.unwrap();
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Connected);
        assert_eq!(client.open_sessions(), 1);

        // Already connected: no second physical connect.
        mgr.connect(id).await.unwrap();
        assert_eq!(client.connect_attempts(), 1);

        mgr.disconnect(id).await.unwrap();
        mgr.disconnect(id).await.unwrap();
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Disconnected);
        assert_eq!(client.open_sessions(), 0);

        let statuses: Vec<ConnectionStatus> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                ConnectionEvent::StateChanged { status, .. } => Some(status),
                _ => None,
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

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_share_one_attempt() {
        let (client, _, mgr) = setup();
        client.set_connect_delay(Duration::from_millis(50));
        let mgr = Arc::new(mgr);
        let id = mgr.create(config()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mgr = Arc::clone(&mgr);
                tokio::spawn(async move { mgr.connect(id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(client.connect_attempts(), 1);
        assert_eq!(client.open_sessions(), 1);
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_with_category() {
        let client = Arc::new(SimClient::new());
        let mgr = ConnectionManager::new(client.clone());
        let mut events = mgr.take_events().await.unwrap();
        let id = mgr.create(config()).await.unwrap();

        let err = mgr.connect(id).await.unwrap_err();
        let failure = err.connect_failure().unwrap();
        assert_eq!(failure.category, FailureCategory::ConnectionRefused);
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Failed);

        let failed = std::iter::from_fn(|| events.try_recv().ok()).find_map(|e| match e {
            ConnectionEvent::StateChanged {
                status: ConnectionStatus::Failed,
                failure,
                ..
            } => failure,
            _ => None,
        });
        assert_eq!(failed.as_ref(), Some(failure));

        // Failed -> Connecting is a legal retry.
        client.register(ENDPOINT, Arc::new(SimServer::new()));
        mgr.connect(id).await.unwrap();
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_endpoint_times_out() {
        let client = Arc::new(SimClient::new());
        client.set_unresponsive(ENDPOINT);
        let mgr = ConnectionManager::new(client).with_timeouts(Timeouts {
            connect: Duration::from_secs(3),
            ..Timeouts::default()
        });
        let id = mgr.create(config()).await.unwrap();

        let err = mgr.connect(id).await.unwrap_err();
        assert_eq!(err.connect_failure().unwrap().category, FailureCategory::Timeout);
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_connect_leaves_disconnected() {
        let (client, _, mgr) = setup();
        client.set_connect_delay(Duration::from_secs(1));
        let mgr = Arc::new(mgr);
        let id = mgr.create(config()).await.unwrap();

        let connecting = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.connect(id).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Connecting);

        mgr.disconnect(id).await.unwrap();
        let result = connecting.await.unwrap();
        assert_eq!(result, Err(ConnectionError::Cancelled(id)));
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Disconnected);
        assert_eq!(client.open_sessions(), 0);

        // A later connect starts fresh.
        mgr.connect(id).await.unwrap();
        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn dropped_caller_does_not_strand_connecting() {
        let (client, _, mgr) = setup();
        client.set_connect_delay(Duration::from_millis(20));
        let id = mgr.create(config()).await.unwrap();

        // Start and immediately abandon the connect.
        let _ = tokio::time::timeout(Duration::from_millis(1), mgr.connect(id)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Connected);
        assert_eq!(client.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn delete_connected_connection() {
        let (client, _, mgr) = setup();
        let mut events = mgr.take_events().await.unwrap();
        let id = mgr.create(config()).await.unwrap();
        mgr.connect(id).await.unwrap();
        let token = mgr.session(id).await.unwrap().1;

        mgr.delete(id).await.unwrap();
        assert!(token.is_cancelled());
        assert!(mgr.list().await.is_empty());
        assert_eq!(client.open_sessions(), 0);
        assert!(matches!(mgr.connect(id).await, Err(ConnectionError::NotFound(_))));
        assert!(matches!(mgr.delete(id).await, Err(ConnectionError::NotFound(_))));

        let removed = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| e == ConnectionEvent::Removed { connection_id: id });
        assert!(removed);
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let (_, _, mgr) = setup();
        let id = mgr.create(config()).await.unwrap();
        let node = NodeId::string(1, "main.q1");

        assert!(matches!(mgr.read(id, &node).await, Err(ConnectionError::NotConnected(_))));
        assert!(matches!(
            mgr.write(id, &node, &json!(1), DataType::Int16).await,
            Err(ConnectionError::NotConnected(_))
        ));
        assert!(matches!(mgr.browse_variables(id).await, Err(ConnectionError::NotConnected(_))));
        assert!(matches!(
            mgr.read(ConnectionId::new(), &node).await,
            Err(ConnectionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn browse_merges_declared_and_discovered() {
        let (_, _, mgr) = setup();
        let mut cfg = config();
        cfg.variables.push(DeclaredVariable {
            name: "Power switch".into(),
            node_id: NodeId::string(1, "main.power_on"),
            description: "operator".into(),
        });
        let id = mgr.create(cfg).await.unwrap();
        mgr.connect(id).await.unwrap();

        let outcome = mgr.browse_variables(id).await.unwrap();
        assert!(outcome.partial_failures.is_empty());

        let power: Vec<_> = outcome
            .variables
            .iter()
            .filter(|v| v.node_id == NodeId::string(1, "main.power_on"))
            .collect();
        assert_eq!(power.len(), 1);
        assert_eq!(power[0].name, "Power switch");
        assert_eq!(power[0].provenance, Provenance::Declared);
        assert_eq!(power[0].value, Variant::Boolean(false));
        assert_eq!(power[0].data_type, DataType::Boolean);

        // Library prefixes are stripped from display names only.
        let counter = outcome
            .variables
            .iter()
            .find(|v| v.node_id == NodeId::string(1, "ST_PRG_WITH_RS_LIB.counter"))
            .unwrap();
        assert_eq!(counter.name, "counter");

        assert_eq!(mgr.list().await[0].variable_count, outcome.variables.len());
    }

    #[tokio::test]
    async fn write_then_read_declared_variable() {
        let (_, server, mgr) = setup();
        let id = mgr.create(config()).await.unwrap();
        mgr.connect(id).await.unwrap();
        let node = NodeId::string(1, "main.power_on");

        let status = mgr.write(id, &node, &json!(true), DataType::Boolean).await.unwrap();
        assert!(status.is_good());
        assert_eq!(server.value(&node), Some(Variant::Boolean(true)));

        let reading = mgr.read(id, &node).await.unwrap();
        assert_eq!(reading.value, Variant::Boolean(true));
        assert_eq!(reading.data_type, DataType::Boolean);
    }

    #[tokio::test]
    async fn add_and_remove_variable() {
        let (_, _, mgr) = setup();
        let id = mgr.create(config()).await.unwrap();
        let node = NodeId::string(1, "main.q1");
        let var = DeclaredVariable {
            name: "q1".into(),
            node_id: node.clone(),
            description: String::new(),
        };

        assert!(mgr.add_variable(id, var.clone()).await.unwrap());
        assert!(!mgr.add_variable(id, var).await.unwrap());
        assert_eq!(mgr.entries(id).await.unwrap().len(), 1);
        assert!(mgr.remove_variable(id, &node).await.unwrap());
        assert!(!mgr.remove_variable(id, &node).await.unwrap());
        assert!(mgr.entries(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_all_closes_every_session() {
        let (client, _, mgr) = setup();
        let a = mgr.create(config()).await.unwrap();
        let b = mgr.create(config()).await.unwrap();
        mgr.connect(a).await.unwrap();
        mgr.connect(b).await.unwrap();
        assert_eq!(client.open_sessions(), 2);

        mgr.disconnect_all().await;
        assert_eq!(client.open_sessions(), 0);
        for id in [a, b] {
            assert_eq!(mgr.status(id).await.unwrap(), ConnectionStatus::Disconnected);
        }
        assert_eq!(mgr.list().await.len(), 2);
    }
}
