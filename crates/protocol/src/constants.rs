use std::time::Duration;

/// Namespace index assumed for declared variables when none is configured.
pub const DEFAULT_NAMESPACE_INDEX: u16 = 1;

/// Standard namespace holding server/system nodes.
pub const SYSTEM_NAMESPACE: u16 = 0;

/// Well-known numeric identifier of the RootFolder node.
pub const ROOT_FOLDER: u32 = 84;

/// Well-known numeric identifier of the ObjectsFolder node.
pub const OBJECTS_FOLDER: u32 = 85;

/// Well-known numeric identifier of the Server object.
pub const SERVER_FOLDER: u32 = 2253;

/// Interval between two variable snapshots of a connection.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline for opening a connection and its session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single browse, read, write or close call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifetime requested from the controller.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Ports probed by an endpoint scan when none are given.
pub const DEFAULT_SCAN_PORTS: [u16; 5] = [4840, 4841, 4842, 48010, 48020];
