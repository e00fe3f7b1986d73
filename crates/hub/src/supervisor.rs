use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plcwatch_hub_connection::{ConnectionError, ConnectionEvent, ConnectionManager};
use plcwatch_hub_poller::Poller;
use plcwatch_protocol::constants::DEFAULT_SCAN_PORTS;
use plcwatch_protocol::{Broadcast, Command, CommandResult, ResultPayload};

/// Front door of the supervisory core.
///
/// Every command goes through [`dispatch`](Self::dispatch). Connection
/// events and poll snapshots are forwarded as [`Broadcast`]s.
pub struct Supervisor {
    connections: Arc<ConnectionManager>,
    poller: Arc<Poller>,
    broadcasts_rx: Mutex<Option<mpsc::Receiver<Broadcast>>>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Wires the registry and poller and starts forwarding their events.
    ///
    /// Takes both event receivers; callers must not take them beforehand.
    pub async fn start(connections: Arc<ConnectionManager>, poller: Arc<Poller>) -> Self {
        let (broadcasts_tx, broadcasts_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        match (connections.take_events().await, poller.take_updates().await) {
            (Some(events), Some(updates)) => {
                tokio::spawn(forward(
                    Arc::clone(&connections),
                    events,
                    updates,
                    broadcasts_tx,
                    cancel.clone(),
                ));
            }
            _ => warn!("event receivers already taken, broadcasts disabled"),
        }

        Self {
            connections,
            poller,
            broadcasts_rx: Mutex::new(Some(broadcasts_rx)),
            cancel,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    /// Takes the broadcast receiver. Can only be called once.
    pub async fn take_broadcasts(&self) -> Option<mpsc::Receiver<Broadcast>> {
        self.broadcasts_rx.lock().await.take()
    }

    /// Runs one command to completion.
    pub async fn dispatch(&self, command: Command) -> CommandResult {
        debug!(request = ?command.kind(), connection = ?command.connection_id(), "dispatching command");
        let result = self.execute(&command).await;
        if !result.success {
            info!(request = ?result.request, message = %result.message, "command failed");
        }
        result
    }

    async fn execute(&self, command: &Command) -> CommandResult {
        let mgr = &self.connections;
        match command {
            Command::CreateConnection { config } => match mgr.create(config.clone()).await {
                Ok(connection_id) => CommandResult::ok(
                    command,
                    "Connection created",
                    Some(ResultPayload::Created { connection_id }),
                ),
                Err(e) => failed(command, &e),
            },

            Command::ListConnections => CommandResult::ok(
                command,
                "Connections listed",
                Some(ResultPayload::Connections(mgr.list().await)),
            ),

            Command::Connect { connection_id } => match mgr.connect(*connection_id).await {
                Ok(()) => {
                    self.poller.start(*connection_id).await;
                    CommandResult::ok(command, "Connected", None)
                }
                Err(e) => failed(command, &e),
            },

            Command::Disconnect { connection_id } => {
                self.poller.stop(*connection_id);
                match mgr.disconnect(*connection_id).await {
                    Ok(()) => CommandResult::ok(command, "Disconnected", None),
                    Err(e) => failed(command, &e),
                }
            }

            Command::Delete { connection_id } => {
                self.poller.stop(*connection_id);
                match mgr.delete(*connection_id).await {
                    Ok(()) => CommandResult::ok(command, "Connection deleted", None),
                    Err(e) => failed(command, &e),
                }
            }

            Command::BrowseVariables { connection_id } => {
                match mgr.browse_variables(*connection_id).await {
                    Ok(outcome) => {
                        let message = if outcome.partial_failures.is_empty() {
                            format!("Found {} variables", outcome.variables.len())
                        } else {
                            format!(
                                "Found {} variables, {} subtrees could not be explored",
                                outcome.variables.len(),
                                outcome.partial_failures.len()
                            )
                        };
                        CommandResult::ok(command, message, Some(ResultPayload::Browse(outcome)))
                    }
                    Err(e) => failed(command, &e),
                }
            }

            Command::ReadVariable {
                connection_id,
                node_id,
            } => match mgr.read(*connection_id, node_id).await {
                Ok(reading) => {
                    CommandResult::ok(command, "Variable read", Some(ResultPayload::Reading(reading)))
                }
                Err(e) => failed(command, &e),
            },

            Command::WriteVariable {
                connection_id,
                node_id,
                value,
                data_type,
            } => match mgr.write(*connection_id, node_id, value, *data_type).await {
                Ok(status) => CommandResult::ok(command, format!("Write completed: {status}"), None),
                Err(e) => failed(command, &e),
            },

            Command::AddVariable {
                connection_id,
                variable,
            } => match mgr.add_variable(*connection_id, variable.clone()).await {
                Ok(true) => CommandResult::ok(command, "Variable added", None),
                Ok(false) => CommandResult::ok(command, "Variable updated", None),
                Err(e) => failed(command, &e),
            },

            Command::RemoveVariable {
                connection_id,
                node_id,
            } => match mgr.remove_variable(*connection_id, node_id).await {
                Ok(true) => CommandResult::ok(command, "Variable removed", None),
                Ok(false) => CommandResult::failed(command, format!("Variable {node_id} is not declared"), None),
                Err(e) => failed(command, &e),
            },

            Command::TestEndpoint { endpoint } => {
                let report = mgr.test_endpoint(endpoint).await;
                let (success, message) = (report.success, report.message.clone());
                reported(command, success, message, ResultPayload::Endpoint(report))
            }

            Command::ScanEndpoints { base_url, ports } => {
                let ports: &[u16] = if ports.is_empty() { &DEFAULT_SCAN_PORTS } else { ports };
                let report = mgr.scan_endpoints(base_url, ports).await;
                let (success, message) = (report.success, report.message.clone());
                reported(command, success, message, ResultPayload::Scan(report))
            }
        }
    }

    /// Stops every timer, disconnects every connection and ends forwarding.
    pub async fn shutdown(&self) {
        info!("supervisor shutting down");
        self.poller.stop_all();
        self.connections.disconnect_all().await;
        self.cancel.cancel();
    }
}

/// Diagnostic results carry their report whether or not it succeeded.
fn reported(command: &Command, success: bool, message: String, payload: ResultPayload) -> CommandResult {
    if success {
        CommandResult::ok(command, message, Some(payload))
    } else {
        CommandResult::failed(command, message, Some(payload))
    }
}

fn failed(command: &Command, error: &ConnectionError) -> CommandResult {
    let payload = error.connect_failure().cloned().map(ResultPayload::Failure);
    CommandResult::failed(command, error.to_string(), payload)
}

/// Turns registry events and poll snapshots into broadcasts.
async fn forward(
    connections: Arc<ConnectionManager>,
    mut events: mpsc::Receiver<ConnectionEvent>,
    mut updates: mpsc::Receiver<Broadcast>,
    tx: mpsc::Sender<Broadcast>,
    cancel: CancellationToken,
) {
    loop {
        let broadcast = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(update) = updates.recv() => update,
            event = events.recv() => match event {
                Some(ConnectionEvent::StateChanged { connection_id, status, failure }) => {
                    Broadcast::ConnectionStatus {
                        connection_id,
                        status,
                        connected: status.is_connected(),
                        failure,
                    }
                }
                Some(ConnectionEvent::Created { .. } | ConnectionEvent::Removed { .. }) => {
                    Broadcast::ConnectionList {
                        connections: connections.list().await,
                    }
                }
                None => {
                    debug!("connection event channel closed");
                    break;
                }
            },
        };

        if let Err(e) = tx.try_send(broadcast) {
            debug!(error = %e, "broadcast dropped");
        }
    }
}
