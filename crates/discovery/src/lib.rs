//! Address-space discovery for plcwatch connections.
//!
//! Finds the variables a controller exposes without prior knowledge of
//! its layout: a probe of well-known ids followed by a bounded, cycle-safe
//! traversal from the standard seed folders.

pub mod explorer;
pub mod filter;
pub mod types;

// Re-export primary types.
pub use explorer::Explorer;
pub use filter::{DEFAULT_DENY_KEYWORDS, FilterPolicy};
pub use types::{
    DEFAULT_DEPTH_BONUS, DEFAULT_MAX_DEPTH, DEFAULT_PROBE_IDS, DiscoveryReport, ExplorerConfig,
};
