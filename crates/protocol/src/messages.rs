use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;
use crate::types::{
    ConnectFailure, ConnectionConfig, ConnectionId, ConnectionStatus, DataType, DeclaredVariable,
    DiscoveryFailure, Variant, VariableDescriptor,
};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A command issued by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    CreateConnection {
        config: ConnectionConfig,
    },
    ListConnections,
    Connect {
        connection_id: ConnectionId,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Delete {
        connection_id: ConnectionId,
    },
    BrowseVariables {
        connection_id: ConnectionId,
    },
    ReadVariable {
        connection_id: ConnectionId,
        node_id: NodeId,
    },
    WriteVariable {
        connection_id: ConnectionId,
        node_id: NodeId,
        value: serde_json::Value,
        data_type: DataType,
    },
    AddVariable {
        connection_id: ConnectionId,
        variable: DeclaredVariable,
    },
    RemoveVariable {
        connection_id: ConnectionId,
        node_id: NodeId,
    },
    TestEndpoint {
        endpoint: String,
    },
    ScanEndpoints {
        base_url: String,
        #[serde(default)]
        ports: Vec<u16>,
    },
}

/// Request kind used to correlate a [`CommandResult`] with its command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    CreateConnection,
    ListConnections,
    Connect,
    Disconnect,
    Delete,
    BrowseVariables,
    ReadVariable,
    WriteVariable,
    AddVariable,
    RemoveVariable,
    TestEndpoint,
    ScanEndpoints,
}

impl Command {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::CreateConnection { .. } => RequestKind::CreateConnection,
            Self::ListConnections => RequestKind::ListConnections,
            Self::Connect { .. } => RequestKind::Connect,
            Self::Disconnect { .. } => RequestKind::Disconnect,
            Self::Delete { .. } => RequestKind::Delete,
            Self::BrowseVariables { .. } => RequestKind::BrowseVariables,
            Self::ReadVariable { .. } => RequestKind::ReadVariable,
            Self::WriteVariable { .. } => RequestKind::WriteVariable,
            Self::AddVariable { .. } => RequestKind::AddVariable,
            Self::RemoveVariable { .. } => RequestKind::RemoveVariable,
            Self::TestEndpoint { .. } => RequestKind::TestEndpoint,
            Self::ScanEndpoints { .. } => RequestKind::ScanEndpoints,
        }
    }

    /// Connection the command targets, if any.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            Self::Connect { connection_id }
            | Self::Disconnect { connection_id }
            | Self::Delete { connection_id }
            | Self::BrowseVariables { connection_id }
            | Self::ReadVariable { connection_id, .. }
            | Self::WriteVariable { connection_id, .. }
            | Self::AddVariable { connection_id, .. }
            | Self::RemoveVariable { connection_id, .. } => Some(*connection_id),
            Self::CreateConnection { .. }
            | Self::ListConnections
            | Self::TestEndpoint { .. }
            | Self::ScanEndpoints { .. } => None,
        }
    }

    /// Node the command targets, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::ReadVariable { node_id, .. }
            | Self::WriteVariable { node_id, .. }
            | Self::RemoveVariable { node_id, .. } => Some(node_id),
            Self::AddVariable { variable, .. } => Some(&variable.node_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Correlated outcome of one [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub request: RequestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResultPayload>,
}

impl CommandResult {
    /// A successful result for `command`.
    pub fn ok(command: &Command, message: impl Into<String>, payload: Option<ResultPayload>) -> Self {
        Self {
            request: command.kind(),
            connection_id: command.connection_id(),
            node_id: command.node_id().cloned(),
            success: true,
            message: message.into(),
            payload,
        }
    }

    /// A failed result for `command`.
    pub fn failed(command: &Command, message: impl Into<String>, payload: Option<ResultPayload>) -> Self {
        Self {
            success: false,
            ..Self::ok(command, message, payload)
        }
    }
}

/// Typed payload of a [`CommandResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Created {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },
    Connections(Vec<ConnectionSummary>),
    Failure(ConnectFailure),
    Browse(BrowseOutcome),
    Reading(VariableReading),
    Endpoint(EndpointReport),
    Scan(ScanReport),
}

/// Registry entry as shown in the connection list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub name: String,
    pub endpoint: String,
    pub namespace: Option<String>,
    pub namespace_index: u16,
    pub status: ConnectionStatus,
    pub is_connected: bool,
    pub variable_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Result of a browse-variables command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseOutcome {
    pub variables: Vec<VariableDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partial_failures: Vec<DiscoveryFailure>,
}

/// Result of a single-variable read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableReading {
    pub value: Variant,
    pub data_type: DataType,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

/// Diagnostic result of testing one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointReport {
    pub endpoint: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ConnectFailure>,
}

/// Result of scanning several ports of one host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub success: bool,
    pub message: String,
    pub results: Vec<EndpointReport>,
}

// ---------------------------------------------------------------------------
// Broadcasts
// ---------------------------------------------------------------------------

/// One variable's entry in a poll snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSnapshot {
    pub name: String,
    pub value: Variant,
    pub data_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Unsolicited notification pushed to every presentation client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Broadcast {
    /// Full registry listing, sent on create/delete.
    ConnectionList { connections: Vec<ConnectionSummary> },
    /// A connection's status changed.
    ConnectionStatus {
        connection_id: ConnectionId,
        status: ConnectionStatus,
        connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<ConnectFailure>,
    },
    /// Periodic variable snapshot keyed by node id.
    VariablesUpdate {
        connection_id: ConnectionId,
        variables: BTreeMap<NodeId, VariableSnapshot>,
    },
}
