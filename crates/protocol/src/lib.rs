//! Shared types for plcwatch.
//!
//! Defines the tag-access collaborator interface ([`TagClient`],
//! [`TagSession`]), the address-space value types, and the typed
//! command/result/broadcast messages exchanged with the presentation layer.

pub mod constants;
pub mod messages;
pub mod node_id;
pub mod session;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{Broadcast, Command, CommandResult, RequestKind, ResultPayload};
pub use node_id::{Identifier, NodeId, NodeIdParseError};
pub use session::{BoxFuture, ConnectOptions, RetryPolicy, TagClient, TagSession, TransportError};
pub use types::{
    ConnectFailure, ConnectionConfig, ConnectionId, ConnectionStatus, DataType, DataValue,
    DeclaredVariable, DiscoveryFailure, FailureCategory, NodeClass, Provenance, Reference,
    StatusCode, Variant, VariableDescriptor,
};
