//! Daemon configuration.
//!
//! Read from a TOML file whose path is the first command-line argument or
//! `PLCWATCH_CONFIG`. Every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use plcwatch_catalog::sanitize::DEFAULT_PREFIXES;
use plcwatch_discovery::ExplorerConfig;
use plcwatch_hub_connection::Timeouts;
use plcwatch_protocol::ConnectionConfig;
use plcwatch_protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_SESSION_TIMEOUT,
};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PLCWATCH_CONFIG";

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval between variable snapshots, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Serve the built-in demo controller at `simulator_endpoint`.
    #[serde(default)]
    pub simulate: bool,

    #[serde(default = "default_simulator_endpoint")]
    pub simulator_endpoint: String,

    /// Prefixes stripped from variable display names.
    #[serde(default = "default_sanitizer_prefixes")]
    pub sanitizer_prefixes: Vec<String>,

    #[serde(default)]
    pub explorer: ExplorerConfig,

    /// Connections registered at startup.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_operation_timeout_ms() -> u64 {
    DEFAULT_OPERATION_TIMEOUT.as_millis() as u64
}

fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT.as_millis() as u64
}

fn default_simulator_endpoint() -> String {
    "opc.tcp://localhost:4840".into()
}

fn default_sanitizer_prefixes() -> Vec<String> {
    DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            simulate: false,
            simulator_endpoint: default_simulator_endpoint(),
            sanitizer_prefixes: default_sanitizer_prefixes(),
            explorer: ExplorerConfig::default(),
            connections: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the file at `path`, or the defaults when there is none.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            operation: Duration::from_millis(self.operation_timeout_ms),
            session: Duration::from_millis(self.session_timeout_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Resolves the config path from the CLI argument, then the environment.
pub fn config_path(arg: Option<String>) -> Option<PathBuf> {
    arg.or_else(|| std::env::var(CONFIG_ENV).ok())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}
