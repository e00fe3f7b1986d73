//! Collaborator interface of the underlying tag-access protocol.
//!
//! The wire protocol itself lives outside this workspace. An implementation
//! provides a [`TagClient`] that opens [`TagSession`]s; everything in the
//! supervisory layer talks to controllers exclusively through these traits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SESSION_TIMEOUT;
use crate::node_id::NodeId;
use crate::types::{DataValue, Reference, StatusCode, Variant};

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by the transport/session collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("address resolution failed: {0}")]
    Resolve(String),

    #[error("connection refused: {0}")]
    Refused(String),

    #[error("operation timed out")]
    Timeout,

    #[error("invalid internal state: {0}")]
    InvalidState(String),

    #[error("security negotiation failed: {0}")]
    Security(String),

    #[error("session closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("bad status: {0}")]
    BadStatus(StatusCode),

    #[error("{0}")]
    Other(String),
}

/// Retry parameters handed to the collaborator's connect strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    pub max_delay_ms: u64,
    /// Retries after the first attempt.
    pub max_retry: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            max_delay_ms: 10_000,
            max_retry: 5,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            max_retry: 0,
        }
    }

    /// Delay before retry `attempt` (1-based), doubling up to the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms.max(self.initial_delay_ms));
        Duration::from_millis(ms)
    }
}

/// Options for opening a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub retry: RetryPolicy,
    pub session_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

/// Opens sessions against controller endpoints.
pub trait TagClient: Send + Sync {
    /// Connects to `endpoint` and opens a session.
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
        options: &'a ConnectOptions,
    ) -> BoxFuture<'a, Result<Arc<dyn TagSession>, TransportError>>;
}

/// An open session on one controller.
pub trait TagSession: Send + Sync {
    /// Enumerates the children of `node`.
    fn browse<'a>(&'a self, node: &'a NodeId)
    -> BoxFuture<'a, Result<Vec<Reference>, TransportError>>;

    /// Reads the current value of a variable node.
    fn read_value<'a>(&'a self, node: &'a NodeId) -> BoxFuture<'a, Result<DataValue, TransportError>>;

    /// Writes a typed value and returns the controller's status.
    fn write<'a>(
        &'a self,
        node: &'a NodeId,
        value: Variant,
    ) -> BoxFuture<'a, Result<StatusCode, TransportError>>;

    /// Closes the session.
    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}
