//! Supervisor tying the connection registry and the poller together.
//!
//! Dispatches typed [`Command`](plcwatch_protocol::Command)s and merges
//! lifecycle events and poll snapshots into one
//! [`Broadcast`](plcwatch_protocol::Broadcast) stream.

mod supervisor;

pub use supervisor::Supervisor;
