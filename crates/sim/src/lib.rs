//! In-memory controller for plcwatch.
//!
//! [`SimServer`] holds a small address space (folders, variables, injected
//! faults) and [`SimClient`] opens sessions on registered endpoints. Both
//! implement the collaborator traits from `plcwatch-protocol`, so the whole
//! supervisory stack can run without a real controller.

mod client;
mod server;

pub use client::{SimClient, SimSession};
pub use server::SimServer;
