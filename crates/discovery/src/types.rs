use serde::{Deserialize, Serialize};

use plcwatch_protocol::constants::{DEFAULT_NAMESPACE_INDEX, OBJECTS_FOLDER, ROOT_FOLDER, SERVER_FOLDER};
use plcwatch_protocol::{DiscoveryFailure, NodeId, VariableDescriptor};

use crate::filter::FilterPolicy;

/// Default traversal depth limit.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Extra depth granted below a folder whose name matches an interesting keyword.
pub const DEFAULT_DEPTH_BONUS: usize = 2;

/// Identifiers of the controller program's well-known variables.
pub const DEFAULT_PROBE_IDS: [&str; 19] = [
    "main.power_on",
    "main.start_demo",
    "main.stop",
    "main.reset",
    "main.enable_demo",
    "main.AG",
    "main.A1",
    "main.A2",
    "main.A3",
    "main.L1",
    "main.L2",
    "main.R1",
    "main.R2",
    "main.Init_Eno",
    "main.Init_Done",
    "main.toggle",
    "main.notToggle",
    "main.q1",
    "main.q2",
];

/// Exploration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Node ids read directly before any traversal.
    pub probes: Vec<NodeId>,
    /// Numeric identifiers of the well-known folders used as seeds.
    pub seed_folders: Vec<u32>,
    /// Namespaces the seed folders are tried in.
    pub namespaces: Vec<u16>,
    pub max_depth: usize,
    pub depth_bonus: usize,
    /// Folder-name keywords that earn the depth bonus and keep failed reads.
    pub interesting_keywords: Vec<String>,
    pub filter: FilterPolicy,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            probes: DEFAULT_PROBE_IDS
                .iter()
                .map(|id| NodeId::string(DEFAULT_NAMESPACE_INDEX, *id))
                .collect(),
            seed_folders: vec![ROOT_FOLDER, OBJECTS_FOLDER, SERVER_FOLDER],
            namespaces: (0..=5).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
            depth_bonus: DEFAULT_DEPTH_BONUS,
            interesting_keywords: vec!["main".to_string()],
            filter: FilterPolicy::default(),
        }
    }
}

impl ExplorerConfig {
    /// Seed nodes in traversal order: the preferred namespace first, then
    /// the configured namespaces in order, without duplicates.
    pub fn seeds(&self, preferred_namespace: u16) -> Vec<NodeId> {
        let mut namespaces = vec![preferred_namespace];
        namespaces.extend(self.namespaces.iter().copied().filter(|ns| *ns != preferred_namespace));

        let mut seeds: Vec<NodeId> = Vec::new();
        for ns in namespaces {
            for id in &self.seed_folders {
                let seed = NodeId::numeric(ns, *id);
                if !seeds.contains(&seed) {
                    seeds.push(seed);
                }
            }
        }
        seeds
    }

    /// Whether a folder name contains an interesting keyword (case-insensitive).
    pub fn is_interesting_folder(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.interesting_keywords
            .iter()
            .any(|k| name.contains(&k.to_lowercase()))
    }

    /// Whether a variable whose read failed should still be reported.
    pub fn keep_failed(&self, node: &NodeId, browse_name: &str) -> bool {
        self.filter.is_marked(node, "")
            || self
                .interesting_keywords
                .iter()
                .any(|k| browse_name.eq_ignore_ascii_case(k))
    }
}

/// Result of one exploration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    /// Variables found, unique by node id. Probe hits come first.
    pub variables: Vec<VariableDescriptor>,
    /// Seeds or subtrees that could not be explored.
    pub failures: Vec<DiscoveryFailure>,
    /// Number of distinct nodes visited.
    pub visited: usize,
}
