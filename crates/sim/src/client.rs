use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

use plcwatch_protocol::{
    BoxFuture, ConnectOptions, DataValue, NodeId, Reference, StatusCode, TagClient, TagSession,
    TransportError, Variant,
};

use crate::server::SimServer;

#[derive(Debug, Clone)]
enum Endpoint {
    Up(Arc<SimServer>),
    Down(TransportError),
    Hang,
}

/// Opens [`SimSession`]s on registered endpoints.
///
/// Unregistered endpoints refuse connections. The client honors the retry
/// policy in [`ConnectOptions`] for refused connections.
#[derive(Debug, Default)]
pub struct SimClient {
    endpoints: Mutex<HashMap<String, Endpoint>>,
    connect_delay: Mutex<Duration>,
    attempts: AtomicUsize,
    open_sessions: Arc<AtomicUsize>,
}

impl SimClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `server` at `endpoint`.
    pub fn register(&self, endpoint: &str, server: Arc<SimServer>) {
        self.lock().insert(endpoint.to_string(), Endpoint::Up(server));
    }

    /// Makes connects to `endpoint` fail with `error`.
    pub fn set_unreachable(&self, endpoint: &str, error: TransportError) {
        self.lock().insert(endpoint.to_string(), Endpoint::Down(error));
    }

    /// Makes connects to `endpoint` never complete.
    pub fn set_unresponsive(&self, endpoint: &str) {
        self.lock().insert(endpoint.to_string(), Endpoint::Hang);
    }

    /// Delays every connect attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Number of physical connect calls made so far.
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, endpoint: &str) -> Endpoint {
        self.lock().get(endpoint).cloned().unwrap_or_else(|| {
            Endpoint::Down(TransportError::Refused(format!(
                "connect ECONNREFUSED {endpoint}"
            )))
        })
    }
}

impl TagClient for SimClient {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<Arc<dyn TagSession>, TransportError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = *self.connect_delay.lock().unwrap_or_else(|e| e.into_inner());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut retry = 0;
            loop {
                match self.lookup(endpoint) {
                    Endpoint::Up(server) => {
                        debug!(endpoint, "sim session opened");
                        self.open_sessions.fetch_add(1, Ordering::SeqCst);
                        let session: Arc<dyn TagSession> = Arc::new(SimSession {
                            server,
                            closed: AtomicBool::new(false),
                            open_sessions: Arc::clone(&self.open_sessions),
                        });
                        return Ok(session);
                    }
                    Endpoint::Hang => std::future::pending::<()>().await,
                    Endpoint::Down(err @ TransportError::Refused(_))
                        if retry < options.retry.max_retry =>
                    {
                        retry += 1;
                        debug!(endpoint, retry, error = %err, "sim connect retry");
                        tokio::time::sleep(options.retry.delay_for_attempt(retry)).await;
                    }
                    Endpoint::Down(err) => return Err(err),
                }
            }
        })
    }
}

/// A session on a [`SimServer`].
#[derive(Debug)]
pub struct SimSession {
    server: Arc<SimServer>,
    closed: AtomicBool,
    open_sessions: Arc<AtomicUsize>,
}

impl SimSession {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl TagSession for SimSession {
    fn browse<'a>(
        &'a self,
        node: &'a NodeId,
    ) -> BoxFuture<'a, Result<Vec<Reference>, TransportError>> {
        Box::pin(async move {
            self.check_open()?;
            tokio::task::yield_now().await;
            self.server.browse(node)
        })
    }

    fn read_value<'a>(&'a self, node: &'a NodeId) -> BoxFuture<'a, Result<DataValue, TransportError>> {
        Box::pin(async move {
            self.check_open()?;
            if let Some(delay) = self.server.read_delay(node) {
                tokio::time::sleep(delay).await;
            }
            self.server.read(node)
        })
    }

    fn write<'a>(
        &'a self,
        node: &'a NodeId,
        value: Variant,
    ) -> BoxFuture<'a, Result<StatusCode, TransportError>> {
        Box::pin(async move {
            self.check_open()?;
            Ok(self.server.write(node, value))
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.open_sessions.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        })
    }
}
