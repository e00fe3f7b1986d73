//! Per-connection poll timers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plcwatch_catalog::read_variable;
use plcwatch_protocol::constants::{DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL};
use plcwatch_protocol::messages::VariableSnapshot;
use plcwatch_protocol::{Broadcast, ConnectionId, NodeId, TagSession, Variant, VariableDescriptor};

use crate::source::VariableSource;

/// A running poll loop.
#[derive(Debug)]
struct Timer {
    generation: u64,
    cancel: CancellationToken,
}

type Timers = Arc<Mutex<HashMap<ConnectionId, Timer>>>;

/// Periodically reads every catalog entry of the connections it polls.
///
/// Each connection has at most one timer. A timer stops on [`stop`](Self::stop)
/// or when the connection's session token is cancelled.
pub struct Poller {
    source: Arc<dyn VariableSource>,
    interval: Duration,
    read_timeout: Duration,
    timers: Timers,
    generation: AtomicU64,
    updates_tx: mpsc::Sender<Broadcast>,
    updates_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Broadcast>>>,
}

impl Poller {
    pub fn new(source: Arc<dyn VariableSource>) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(256);
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
            read_timeout: DEFAULT_OPERATION_TIMEOUT,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            updates_tx,
            updates_rx: tokio::sync::Mutex::new(Some(updates_rx)),
        }
    }

    /// Sets the tick interval. Zero falls back to the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Deadline for each variable read within a tick.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes the snapshot receiver. Can only be called once.
    pub async fn take_updates(&self) -> Option<mpsc::Receiver<Broadcast>> {
        self.updates_rx.lock().await.take()
    }

    /// Starts polling `id`, replacing any timer it already has.
    ///
    /// Returns `false` if the connection has no open session.
    pub async fn start(&self, id: ConnectionId) -> bool {
        let Some((session, session_token)) = self.source.session(id).await else {
            warn!(connection = %id, "polling not started: no open session");
            return false;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = lock(&self.timers).insert(
            id,
            Timer {
                generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(connection = %id, "replaced existing poll timer");
        }

        let poll = PollLoop {
            id,
            generation,
            source: Arc::clone(&self.source),
            session,
            session_token,
            cancel,
            timers: Arc::clone(&self.timers),
            interval: self.interval,
            read_timeout: self.read_timeout,
            updates_tx: self.updates_tx.clone(),
        };
        tokio::spawn(poll.run());

        info!(connection = %id, interval_ms = self.interval.as_millis() as u64, "polling started");
        true
    }

    /// Stops polling `id`. Safe when it is not polled.
    pub fn stop(&self, id: ConnectionId) {
        if let Some(timer) = lock(&self.timers).remove(&id) {
            timer.cancel.cancel();
            info!(connection = %id, "polling stopped");
        }
    }

    /// Stops every timer.
    pub fn stop_all(&self) {
        let timers: Vec<(ConnectionId, Timer)> = lock(&self.timers).drain().collect();
        for (_, timer) in &timers {
            timer.cancel.cancel();
        }
        if !timers.is_empty() {
            info!(count = timers.len(), "all polling stopped");
        }
    }

    pub fn is_polling(&self, id: ConnectionId) -> bool {
        lock(&self.timers).contains_key(&id)
    }

    /// Number of running timers.
    pub fn active(&self) -> usize {
        lock(&self.timers).len()
    }
}

struct PollLoop {
    id: ConnectionId,
    generation: u64,
    source: Arc<dyn VariableSource>,
    session: Arc<dyn TagSession>,
    session_token: CancellationToken,
    cancel: CancellationToken,
    timers: Timers,
    interval: Duration,
    read_timeout: Duration,
    updates_tx: mpsc::Sender<Broadcast>,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.session_token.cancelled() => {
                    debug!(connection = %self.id, "session closed, polling ends");
                    break;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }

        let mut timers = lock(&self.timers);
        if timers.get(&self.id).is_some_and(|t| t.generation == self.generation) {
            timers.remove(&self.id);
        }
    }

    async fn tick(&self) {
        let entries = self.source.entries(self.id).await;
        let variables = read_all(self.session.as_ref(), entries, self.read_timeout).await;
        // A stop that landed during the reads wins over this snapshot.
        if self.cancel.is_cancelled() || self.session_token.is_cancelled() {
            return;
        }

        let failed = variables.values().filter(|v| v.error.is_some()).count();
        if failed > 0 {
            debug!(connection = %self.id, failed, total = variables.len(), "poll tick had read errors");
        }
        let update = Broadcast::VariablesUpdate {
            connection_id: self.id,
            variables,
        };
        if let Err(e) = self.updates_tx.try_send(update) {
            debug!(connection = %self.id, error = %e, "variables update dropped");
        }
    }
}

/// Reads every entry concurrently. A failed read only marks its own entry.
async fn read_all(
    session: &dyn TagSession,
    entries: Vec<VariableDescriptor>,
    timeout: Duration,
) -> BTreeMap<NodeId, VariableSnapshot> {
    join_all(entries.into_iter().map(|entry| async move {
        let snapshot = match read_variable(session, &entry.node_id, timeout).await {
            Ok(reading) => VariableSnapshot {
                name: entry.name,
                value: reading.value,
                data_type: reading.data_type,
                timestamp: reading
                    .source_timestamp
                    .or(reading.server_timestamp)
                    .or_else(|| Some(Utc::now())),
                error: None,
            },
            Err(e) => VariableSnapshot {
                name: entry.name,
                value: Variant::Null,
                data_type: entry.data_type,
                timestamp: Some(Utc::now()),
                error: Some(e.to_string()),
            },
        };
        (entry.node_id, snapshot)
    }))
    .await
    .into_iter()
    .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
