//! Catalog error types.

use plcwatch_protocol::{DataType, NodeId, StatusCode, TransportError};

/// A read of one variable failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    #[error("read of {node} failed: {source}")]
    Transport {
        node: NodeId,
        #[source]
        source: TransportError,
    },

    #[error("read of {node} failed: {status}")]
    BadStatus { node: NodeId, status: StatusCode },
}

/// A raw value could not be converted to the requested data type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot convert {value} to {data_type}")]
pub struct CoercionError {
    pub value: serde_json::Value,
    pub data_type: DataType,
}

/// A write of one variable failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("write of {node} rejected: {status}")]
    Rejected { node: NodeId, status: StatusCode },

    #[error("write of {node} failed: {source}")]
    Transport {
        node: NodeId,
        #[source]
        source: TransportError,
    },
}
