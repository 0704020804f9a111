//! TOML configuration shared by both binaries, overlaid with `clap`
//! CLI flags (SPEC_FULL.md S10.2). Defaults mirror the constants in
//! `examples/original_source/osn_final/project-main/include/common.h`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_COORDINATOR_PORT: u16 = 5000;
pub const DEFAULT_USERNAME_MAX: usize = 64;
pub const DEFAULT_FILENAME_MAX: usize = 256;
pub const DEFAULT_LRU_CAPACITY: u64 = 100;
pub const DEFAULT_MAX_ACL_ENTRIES: usize = 50;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_LIVENESS_THRESHOLD_SECS: u64 = 30;
pub const DEFAULT_MAX_FILE_SIZE: usize = 8192;

/// Coordinator-side configuration, loadable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub lru_capacity: u64,
    pub heartbeat_interval_secs: u64,
    pub liveness_threshold_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_COORDINATOR_PORT,
            data_dir: PathBuf::from("data"),
            lru_capacity: DEFAULT_LRU_CAPACITY,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            liveness_threshold_secs: DEFAULT_LIVENESS_THRESHOLD_SECS,
        }
    }
}

impl CoordinatorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness_threshold_secs)
    }
}

/// Storage-node-side configuration, loadable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub node_id: String,
    pub coordinator_host: String,
    pub coordinator_port: u16,
    /// This node's own listening port for coordinator-issued
    /// `NodeCommand` traffic (ACL grants from APPROVE, EXEC's content
    /// fetch, DELETE propagation) — spec.md S6's "one for coordinator
    /// traffic" port, distinct from `client_port`.
    pub node_coord_port: u16,
    /// This node's listening port for direct client traffic — spec.md
    /// S6's "one for direct client traffic" port.
    pub client_port: u16,
    pub data_dir: PathBuf,
    pub max_acl_entries: usize,
    pub max_file_size: usize,
    pub heartbeat_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            coordinator_host: "127.0.0.1".to_string(),
            coordinator_port: DEFAULT_COORDINATOR_PORT,
            node_coord_port: 0,
            client_port: 0,
            data_dir: PathBuf::from("data"),
            max_acl_entries: DEFAULT_MAX_ACL_ENTRIES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

impl StorageConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Loads a TOML config from `path`, falling back to defaults when the
/// file does not exist (the original C servers take no config file at
/// all; an absent file is not an error here either).
pub fn load<T: Default + for<'de> Deserialize<'de>>(path: Option<&Path>) -> Result<T, String> {
    match path {
        None => Ok(T::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("reading config {}: {e}", path.display()))?;
            toml::from_str(&text).map_err(|e| format!("parsing config {}: {e}", path.display()))
        }
    }
}
