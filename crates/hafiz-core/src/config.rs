//! Configuration for the Hafiz cluster-coordination core
//!
//! Two layers, matching how the rest of the workspace separates concerns:
//! - [`NodeConfig`] — process-level inputs supplied by the launcher (bind
//!   address, node identity, data directory, metadata service URL). Loaded
//!   once at startup from a TOML file with environment-variable overrides.
//! - [`ClusterCoreConfig`] — runtime tunables (periods, replication bounds)
//!   that the config refresher polls from the metadata service and that may
//!   change while the node is running.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Process-level configuration, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's stable identity. Generated and persisted on first boot
    /// if not supplied.
    pub node_id: String,
    /// host:port this node's HTTP blob endpoint is reachable on.
    pub bind_addr: String,
    /// Directory holding locally stored blob data.
    pub data_dir: PathBuf,
    /// Storage ceiling reported to the cluster; `FreeSpace` is clamped to
    /// it. Zero means "no ceiling, report whatever the filesystem reports".
    pub max_storage: u64,
    /// Connection string / URL for the metadata service backend.
    pub metadata_url: String,
    /// Number of concurrent HTTP fetch workers BootstrapPull runs.
    pub verify_workers: usize,
    /// BootstrapPull: max blobs considered per pass.
    pub max_startup_objects: u32,
    /// BootstrapPull: upper bound (exclusive) of the under-replicated
    /// key-range scanned.
    pub max_startup_repls: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            bind_addr: "0.0.0.0:9000".to_string(),
            data_dir: PathBuf::from("/data/hafiz"),
            max_storage: 0,
            metadata_url: "sqlite:///data/hafiz/cluster.db?mode=rwc".to_string(),
            verify_workers: 4,
            max_startup_objects: 1000,
            max_startup_repls: 3,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to parse config: {e}")))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("HAFIZ_NODE_ID") {
            config.node_id = id;
        }
        if let Ok(addr) = std::env::var("HAFIZ_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("HAFIZ_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(max) = std::env::var("HAFIZ_MAX_STORAGE") {
            if let Ok(bytes) = max.parse() {
                config.max_storage = bytes;
            }
        }
        if let Ok(url) = std::env::var("HAFIZ_DATABASE_URL") {
            config.metadata_url = url;
        }
        if let Ok(workers) = std::env::var("HAFIZ_VERIFY_WORKERS") {
            if let Ok(n) = workers.parse() {
                config.verify_workers = n;
            }
        }
        if let Ok(n) = std::env::var("HAFIZ_MAX_START_OBJS") {
            if let Ok(n) = n.parse() {
                config.max_startup_objects = n;
            }
        }
        if let Ok(n) = std::env::var("HAFIZ_MAX_START_REPLS") {
            if let Ok(n) = n.parse() {
                config.max_startup_repls = n;
            }
        }

        config
    }

    /// Merge in non-default values from `other`, preferring `other`'s
    /// fields wherever they diverge from `NodeConfig::default()`. Used to
    /// layer environment overrides on top of a file-loaded config.
    pub fn merged_with(mut self, other: Self) -> Self {
        let default = Self::default();
        if other.node_id != default.node_id {
            self.node_id = other.node_id;
        }
        if other.bind_addr != default.bind_addr {
            self.bind_addr = other.bind_addr;
        }
        if other.data_dir != default.data_dir {
            self.data_dir = other.data_dir;
        }
        if other.max_storage != default.max_storage {
            self.max_storage = other.max_storage;
        }
        if other.metadata_url != default.metadata_url {
            self.metadata_url = other.metadata_url;
        }
        if other.verify_workers != default.verify_workers {
            self.verify_workers = other.verify_workers;
        }
        if other.max_startup_objects != default.max_startup_objects {
            self.max_startup_objects = other.max_startup_objects;
        }
        if other.max_startup_repls != default.max_startup_repls {
            self.max_startup_repls = other.max_startup_repls;
        }
        self
    }
}

/// Runtime tunables, refreshed from the metadata service once a minute by
/// the config refresher. All durations are stored as seconds on the wire
/// (`humantime_serde`-free, matching the source system's plain-integer
/// tunables document) and converted to [`Duration`] at the read site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterCoreConfig {
    pub heartbeat_freq_secs: u64,
    pub stale_node_check_freq_secs: u64,
    pub stale_node_limit_secs: u64,
    pub gc_freq_secs: u64,
    pub gc_limit: u32,
    pub under_replica_check_freq_secs: u64,
    pub over_replica_check_freq_secs: u64,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub node_clean_count: u32,
    pub reconcile_freq_secs: u64,
}

impl Default for ClusterCoreConfig {
    fn default() -> Self {
        Self {
            heartbeat_freq_secs: 30,
            stale_node_check_freq_secs: 60,
            stale_node_limit_secs: 300,
            gc_freq_secs: 120,
            gc_limit: 1000,
            under_replica_check_freq_secs: 60,
            over_replica_check_freq_secs: 300,
            min_replicas: 2,
            max_replicas: 3,
            node_clean_count: 1000,
            reconcile_freq_secs: 600,
        }
    }
}

impl ClusterCoreConfig {
    /// The fixed metadata key the config document lives at.
    pub const KEY: &'static str = "/@config";

    pub fn heartbeat_freq(&self) -> Duration {
        Duration::from_secs(self.heartbeat_freq_secs)
    }

    pub fn stale_node_check_freq(&self) -> Duration {
        Duration::from_secs(self.stale_node_check_freq_secs)
    }

    pub fn stale_node_limit(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_node_limit_secs as i64)
    }

    pub fn gc_freq(&self) -> Duration {
        Duration::from_secs(self.gc_freq_secs)
    }

    pub fn under_replica_check_freq(&self) -> Duration {
        Duration::from_secs(self.under_replica_check_freq_secs)
    }

    pub fn over_replica_check_freq(&self) -> Duration {
        Duration::from_secs(self.over_replica_check_freq_secs)
    }

    pub fn reconcile_freq(&self) -> Duration {
        Duration::from_secs(self.reconcile_freq_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tunables_are_sane() {
        let config = ClusterCoreConfig::default();
        assert!(config.min_replicas <= config.max_replicas);
        assert!(config.heartbeat_freq_secs > 0);
    }

    #[test]
    fn node_config_merge_prefers_non_default_overrides() {
        let file_config = NodeConfig {
            node_id: "from-file".to_string(),
            ..NodeConfig::default()
        };
        let env_config = NodeConfig {
            bind_addr: "127.0.0.1:9100".to_string(),
            ..NodeConfig::default()
        };
        let merged = file_config.merged_with(env_config);
        assert_eq!(merged.node_id, "from-file");
        assert_eq!(merged.bind_addr, "127.0.0.1:9100");
    }
}
