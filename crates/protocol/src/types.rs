use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::constants::DEFAULT_NAMESPACE_INDEX;
use crate::node_id::NodeId;
use crate::session::RetryPolicy;

/// Opaque identifier of a supervised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No session; initial and post-disconnect state.
    #[default]
    Disconnected,
    /// Connect and session-open in progress.
    Connecting,
    /// Session open.
    Connected,
    /// Last connect attempt failed.
    Failed,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Any state may be forced back to `Disconnected`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Failed, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Classification of a connect failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    AddressResolution,
    ConnectionRefused,
    Timeout,
    InvalidSessionState,
    SecurityNegotiation,
    Unknown,
}

impl FailureCategory {
    /// Fixed operator-facing remedy for this category.
    pub fn remedy(self) -> &'static str {
        match self {
            Self::AddressResolution => {
                "The server address may be wrong or cannot be resolved; check the IP address and port."
            }
            Self::ConnectionRefused => {
                "The server may not be running or the port is wrong; confirm the server is running."
            }
            Self::Timeout => {
                "The server may be unreachable; check the network connection and firewall settings."
            }
            Self::InvalidSessionState => {
                "The client connection state is inconsistent; wait a moment and retry."
            }
            Self::SecurityNegotiation => {
                "The server may require a secure connection; check the security mode and policy."
            }
            Self::Unknown => "Check the server address and status.",
        }
    }

    /// Wire name, e.g. `connection-refused`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddressResolution => "address-resolution",
            Self::ConnectionRefused => "connection-refused",
            Self::Timeout => "timeout",
            Self::InvalidSessionState => "invalid-session-state",
            Self::SecurityNegotiation => "security-negotiation",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a failed connect attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectFailure {
    pub category: FailureCategory,
    pub remedy: String,
    pub message: String,
}

impl ConnectFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            remedy: category.remedy().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.category)
    }
}

/// Class of a node reached through a browse reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    ObjectType,
    VariableType,
    ReferenceType,
    DataType,
    View,
}

/// One child returned by a browse call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub node_id: NodeId,
    pub node_class: NodeClass,
    pub browse_name: String,
    #[serde(default)]
    pub display_name: String,
}

impl Reference {
    /// Browse name, falling back to the display name when empty.
    pub fn name(&self) -> &str {
        if self.browse_name.is_empty() {
            &self.display_name
        } else {
            &self.browse_name
        }
    }
}

/// Protocol-level data type tag.
///
/// Parsing never fails: unrecognized tags become [`DataType::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum DataType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    ByteString,
    #[default]
    Unknown,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::ByteString => "ByteString",
            Self::Unknown => "Unknown",
        }
    }

    /// Maps a tag name to a data type (case-insensitive).
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Self::Boolean,
            "sbyte" => Self::SByte,
            "byte" => Self::Byte,
            "int16" => Self::Int16,
            "uint16" => Self::UInt16,
            "int32" => Self::Int32,
            "uint32" => Self::UInt32,
            "int64" => Self::Int64,
            "uint64" => Self::UInt64,
            "float" => Self::Float,
            "double" => Self::Double,
            "string" => Self::String,
            "datetime" => Self::DateTime,
            "bytestring" => Self::ByteString,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        Self::from_tag(&value)
    }
}

impl From<DataType> for &'static str {
    fn from(value: DataType) -> Self {
        value.as_str()
    }
}

/// A typed value as stored in or written to the address space.
///
/// `Raw` carries an untyped JSON value that is handed to the session
/// unchanged. Serializes as the plain JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Variant {
    #[default]
    Null,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    ByteString(Vec<u8>),
    Raw(serde_json::Value),
}

impl Variant {
    /// Data type tag of the contained value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::SByte(_) => DataType::SByte,
            Self::Byte(_) => DataType::Byte,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::DateTime(_) => DataType::DateTime,
            Self::ByteString(_) => DataType::ByteString,
            Self::Null | Self::Raw(_) => DataType::Unknown,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value as JSON for the presentation layer.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::SByte(v) => (*v).into(),
            Self::Byte(v) => (*v).into(),
            Self::Int16(v) => (*v).into(),
            Self::UInt16(v) => (*v).into(),
            Self::Int32(v) => (*v).into(),
            Self::UInt32(v) => (*v).into(),
            Self::Int64(v) => (*v).into(),
            Self::UInt64(v) => (*v).into(),
            Self::Float(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Double(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Self::ByteString(bytes) => Value::String(BASE64_STANDARD.encode(bytes)),
            Self::Raw(v) => v.clone(),
        }
    }
}

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Result status of a read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: Self = Self(0);
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    pub const BAD_USER_ACCESS_DENIED: Self = Self(0x801F_0000);
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    pub const BAD_NOT_READABLE: Self = Self(0x803A_0000);
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);

    /// Only the canonical success status counts. Good subcodes such as
    /// GoodClamped mean the controller altered the request.
    pub fn is_good(self) -> bool {
        self == Self::GOOD
    }

    /// Severity bits are zero.
    pub fn is_good_severity(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GOOD => "Good",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            _ if self.is_good_severity() => "Good",
            _ => "Bad",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

/// A value read from a variable node.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A good value stamped with the current time.
    pub fn good(value: Variant) -> Self {
        let now = Utc::now();
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// A value-less result carrying only a status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: Variant::Null,
            status,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }
}

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Declared,
    Discovered,
}

/// A variable known to a connection's catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDescriptor {
    pub name: String,
    pub node_id: NodeId,
    pub data_type: DataType,
    pub value: Variant,
    pub description: String,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browse_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An operator-declared variable supplied at connection creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredVariable {
    pub name: String,
    pub node_id: NodeId,
    #[serde(default)]
    pub description: String,
}

/// Parameters of a create-connection command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_namespace_index")]
    pub namespace_index: u16,
    #[serde(default)]
    pub variables: Vec<DeclaredVariable>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_namespace_index() -> u16 {
    DEFAULT_NAMESPACE_INDEX
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            namespace: None,
            namespace_index: DEFAULT_NAMESPACE_INDEX,
            variables: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A seed or subtree that could not be explored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFailure {
    pub node_id: NodeId,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_category_wire_names() {
        let json = serde_json::to_string(&FailureCategory::ConnectionRefused).unwrap();
        assert_eq!(json, "\"connection-refused\"");
        assert_eq!(FailureCategory::Timeout.as_str(), "timeout");
        assert!(!FailureCategory::Unknown.remedy().is_empty());
    }

    #[test]
    fn data_type_tags_are_forgiving() {
        assert_eq!(DataType::from_tag("Boolean"), DataType::Boolean);
        assert_eq!(DataType::from_tag("double"), DataType::Double);
        assert_eq!(DataType::from_tag("Decimal128"), DataType::Unknown);

        let parsed: DataType = serde_json::from_str("\"UInt16\"").unwrap();
        assert_eq!(parsed, DataType::UInt16);
        assert_eq!(serde_json::to_string(&DataType::Float).unwrap(), "\"Float\"");
    }

    #[test]
    fn status_transition_table() {
        use ConnectionStatus::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Failed.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Connecting.can_transition_to(Disconnected));

        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Failed.can_transition_to(Connected));
        assert!(!Connecting.can_transition_to(Connecting));
    }

    #[test]
    fn status_code_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::BAD_TYPE_MISMATCH.is_good());

        let clamped = StatusCode(0x0030_0000);
        assert!(!clamped.is_good());
        assert!(clamped.is_good_severity());
        assert_eq!(clamped.name(), "Good");
        assert_eq!(
            StatusCode::BAD_NOT_WRITABLE.to_string(),
            "BadNotWritable (0x803B0000)"
        );
    }

    #[test]
    fn variant_serializes_as_plain_json() {
        assert_eq!(serde_json::to_string(&Variant::Boolean(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Variant::Int16(-3)).unwrap(), "-3");
        assert_eq!(serde_json::to_string(&Variant::Null).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&Variant::ByteString(b"hi".to_vec())).unwrap(),
            "\"aGk=\""
        );
    }

    #[test]
    fn reference_name_falls_back_to_display_name() {
        let r = Reference {
            node_id: NodeId::numeric(1, 5),
            node_class: NodeClass::Variable,
            browse_name: String::new(),
            display_name: "Speed".into(),
        };
        assert_eq!(r.name(), "Speed");
    }

    #[test]
    fn connection_config_defaults() {
        let json = r#"{"name":"Press","endpoint":"opc.tcp://10.0.0.5:4840"}"#;
        let config: ConnectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.namespace_index, DEFAULT_NAMESPACE_INDEX);
        assert!(config.variables.is_empty());
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn connection_id_roundtrip() {
        let id = ConnectionId::new();
        let parsed: ConnectionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
