//! Variable polling for plcwatch connections.
//!
//! Keeps at most one timer per connection. Every tick reads the whole
//! catalog and publishes a [`Broadcast::VariablesUpdate`](plcwatch_protocol::Broadcast).

mod poller;
mod source;

pub use poller::Poller;
pub use source::VariableSource;
