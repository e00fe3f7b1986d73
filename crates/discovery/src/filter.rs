//! System-variable filter applied to discovered variables.

use serde::{Deserialize, Serialize};

use plcwatch_protocol::NodeId;
use plcwatch_protocol::constants::SYSTEM_NAMESPACE;

/// Names of server-internal nodes hidden by default.
pub const DEFAULT_DENY_KEYWORDS: [&str; 11] = [
    "ServerStatus",
    "ServiceLevel",
    "ServerDiagnostics",
    "VendorServerInfo",
    "ServerCapabilities",
    "OperationLimits",
    "ModellingRules",
    "AggregateFunctions",
    "ServerRedundancy",
    "Namespaces",
    "HistoryServerCapabilities",
];

/// Decides which discovered variables are server plumbing rather than
/// controller program variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Substrings of the node id or name that always keep a variable.
    pub keep_markers: Vec<String>,
    /// Exclude every node of the system namespace.
    pub exclude_system_namespace: bool,
    /// Numeric ids below this in the system namespace are excluded.
    pub numeric_threshold: u32,
    /// Case-insensitive substrings of the node id or name that exclude a
    /// variable.
    pub deny_keywords: Vec<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            keep_markers: vec!["main.".to_string()],
            exclude_system_namespace: true,
            numeric_threshold: 1000,
            deny_keywords: DEFAULT_DENY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl FilterPolicy {
    /// A policy that keeps everything.
    pub fn permissive() -> Self {
        Self {
            keep_markers: Vec::new(),
            exclude_system_namespace: false,
            numeric_threshold: 0,
            deny_keywords: Vec::new(),
        }
    }

    /// Whether the node id or name carries a keep marker.
    pub fn is_marked(&self, node: &NodeId, name: &str) -> bool {
        let id = node.identifier_text();
        self.keep_markers
            .iter()
            .any(|m| id.contains(m.as_str()) || name.contains(m.as_str()))
    }

    /// Whether a variable should be hidden.
    pub fn is_system(&self, node: &NodeId, name: &str) -> bool {
        if self.is_marked(node, name) {
            return false;
        }
        if node.namespace == SYSTEM_NAMESPACE {
            if node.as_numeric().is_some_and(|id| id < self.numeric_threshold) {
                return true;
            }
            if self.exclude_system_namespace {
                return true;
            }
        }
        let id = node.identifier_text().to_lowercase();
        let name = name.to_lowercase();
        self.deny_keywords.iter().any(|k| {
            let k = k.to_lowercase();
            id.contains(&k) || name.contains(&k)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_always_keeps() {
        let policy = FilterPolicy::default();
        assert!(!policy.is_system(&NodeId::string(1, "main.power_on"), "power_on"));
        assert!(!policy.is_system(&NodeId::string(0, "main.ServerStatus"), "ServerStatus"));
    }

    #[test]
    fn system_namespace_is_hidden() {
        let policy = FilterPolicy::default();
        assert!(policy.is_system(&NodeId::numeric(0, 2256), "Status"));
        assert!(policy.is_system(&NodeId::numeric(0, 11), "Foo"));
        assert!(policy.is_system(&NodeId::string(0, "Custom"), "Custom"));
    }

    #[test]
    fn threshold_applies_without_namespace_exclusion() {
        let policy = FilterPolicy {
            exclude_system_namespace: false,
            ..FilterPolicy::default()
        };
        assert!(policy.is_system(&NodeId::numeric(0, 999), "Foo"));
        assert!(!policy.is_system(&NodeId::numeric(0, 5000), "Foo"));
        assert!(!policy.is_system(&NodeId::numeric(2, 10), "Foo"));
    }

    #[test]
    fn deny_keywords_are_case_insensitive() {
        let policy = FilterPolicy::default();
        assert!(policy.is_system(&NodeId::string(2, "x"), "serverstatus_copy"));
        assert!(policy.is_system(&NodeId::string(2, "y"), "NAMESPACES"));
        assert!(!policy.is_system(&NodeId::string(2, "z"), "counter"));
    }

    #[test]
    fn deny_keywords_match_the_identifier() {
        let policy = FilterPolicy::default();
        assert!(policy.is_system(&NodeId::string(2, "Server.ServiceLevel"), "Level"));
        assert!(!policy.is_system(&NodeId::string(2, "Line.counter"), "counter"));
    }

    #[test]
    fn permissive_keeps_everything() {
        let policy = FilterPolicy::permissive();
        assert!(!policy.is_system(&NodeId::numeric(0, 2256), "ServerStatus"));
    }
}
