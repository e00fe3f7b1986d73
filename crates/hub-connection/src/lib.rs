//! Connection registry for plcwatch.
//!
//! Drives each controller connection through its lifecycle, runs discovery
//! and typed reads and writes against open sessions, and tests endpoints
//! without registering them.

pub mod classify;
pub mod connection;
pub mod error;
pub mod machine;
pub mod manager;
pub mod tester;
pub mod types;

pub use classify::{classify, connect_failure};
pub use connection::Connection;
pub use error::ConnectionError;
pub use machine::StateMachine;
pub use manager::ConnectionManager;
pub use tester::{scan_endpoints, test_endpoint};
pub use types::{ConnectionEvent, Timeouts};
