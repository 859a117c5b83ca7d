//! hive.toml node configuration.
//!
//! Every field has a default, so an empty file yields a working node
//! configuration for a local test setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tier::NodeTier;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub apps: AppsSection,
    pub scheduler: SchedulerSection,
    pub runtime: RuntimeSection,
    pub chain: ChainSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// External IP advertised in presence messages.
    pub public_ip: String,
    pub api_port: u16,
    pub data_dir: PathBuf,
    /// Peer API addresses (`ip:port`) this node connects out to.
    pub outgoing_peers: Vec<String>,
    /// Peer API addresses that connect in to this node.
    pub incoming_peers: Vec<String>,
    /// Pin the tier instead of deriving it from collateral.
    pub tier: Option<NodeTier>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            public_ip: "127.0.0.1".to_string(),
            api_port: 16127,
            data_dir: PathBuf::from("/var/lib/hive"),
            outgoing_peers: Vec::new(),
            incoming_peers: Vec::new(),
            tier: None,
        }
    }
}

/// Monthly price per resource unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Per 0.1 core.
    pub cpu: f64,
    /// Per 100 MB.
    pub ram: f64,
    /// Per GB.
    pub hdd: f64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            cpu: 3.0,
            ram: 1.0,
            hdd: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsSection {
    pub port_min: u16,
    pub port_max: u16,
    /// Blocks after which an unrenewed specification expires.
    pub blocks_lasting: u64,
    pub price: PriceConfig,
    /// Replication count the network aims for.
    pub target_instances: usize,
    /// Replication count above which replicas prune themselves.
    pub max_instances: usize,
    pub max_image_size_bytes: u64,
    pub max_name_len: usize,
    pub max_description_len: usize,
    pub reserved_prefixes: Vec<String>,
    /// Allowed `namespace` or `namespace/name` entries; `*` allows all.
    pub allowed_repositories: Vec<String>,
    /// Allowed owner identities; `*` allows all.
    pub allowed_owners: Vec<String>,
    pub temporary_ttl_secs: u64,
    pub location_ttl_secs: u64,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    /// Upper bound of the random delay applied to inbound presence messages.
    pub location_ingest_jitter_ms: u64,
    pub missing_request_rounds: u32,
    pub missing_request_wait_secs: u64,
}

impl Default for AppsSection {
    fn default() -> Self {
        Self {
            port_min: 31000,
            port_max: 39999,
            blocks_lasting: 22_000,
            price: PriceConfig::default(),
            target_instances: 3,
            max_instances: 5,
            max_image_size_bytes: 500_000_000,
            max_name_len: 32,
            max_description_len: 256,
            reserved_prefixes: vec!["hive".to_string()],
            allowed_repositories: vec!["*".to_string()],
            allowed_owners: vec!["*".to_string()],
            temporary_ttl_secs: 60 * 60,
            location_ttl_secs: 65 * 60,
            cache_capacity: 500,
            cache_ttl_secs: 10 * 60,
            location_ingest_jitter_ms: 250,
            missing_request_rounds: 7,
            missing_request_wait_secs: 5,
        }
    }
}

impl AppsSection {
    pub fn temporary_ttl(&self) -> Duration {
        Duration::from_secs(self.temporary_ttl_secs)
    }

    pub fn location_ttl(&self) -> Duration {
        Duration::from_secs(self.location_ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn missing_request_wait(&self) -> Duration {
        Duration::from_secs(self.missing_request_wait_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub spawn_delay_secs: u64,
    pub spawn_success_delay_secs: u64,
    pub spawn_throttle_range: u32,
    pub presence_interval_secs: u64,
    /// Upper bound of the random sleep between the presence broadcast steps.
    pub presence_jitter_ms: u64,
    pub prune_interval_secs: u64,
    pub prune_throttle_range: u32,
    pub drift_interval_secs: u64,
    pub drift_throttle_range: u32,
    pub expiration_interval_secs: u64,
    /// Pause between consecutive removals of expired apps.
    pub expiration_pacing_secs: u64,
    pub missing_sweep_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            spawn_delay_secs: 5 * 60,
            spawn_success_delay_secs: 30 * 60,
            spawn_throttle_range: 20,
            presence_interval_secs: 30 * 60,
            presence_jitter_ms: 5_000,
            prune_interval_secs: 30 * 60,
            prune_throttle_range: 5,
            drift_interval_secs: 30 * 60,
            drift_throttle_range: 10,
            expiration_interval_secs: 30 * 60,
            expiration_pacing_secs: 6 * 60,
            missing_sweep_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Docker Engine API address (`host:port`).
    pub docker_endpoint: String,
    /// Shared bridge network all app containers join.
    pub network: String,
    /// Directory holding one mount point per installed app.
    pub apps_folder: PathBuf,
    /// Free space (GB) every volume keeps beyond the app's request.
    pub volume_reserve_gb: u64,
    /// Pause between removal and reinstall during a redeploy.
    pub settle_delay_secs: u64,
    /// Image catalog answering the Docker Hub tags API (`host:port`).
    pub image_catalog_endpoint: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            docker_endpoint: "127.0.0.1:2375".to_string(),
            network: "hivenetwork".to_string(),
            apps_folder: PathBuf::from("/var/lib/hive/apps"),
            volume_reserve_gb: 2,
            settle_delay_secs: 20,
            image_catalog_endpoint: "127.0.0.1:5080".to_string(),
        }
    }
}

impl RuntimeSection {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    /// JSON-RPC address (`host:port`).
    pub rpc_endpoint: String,
    pub rpc_user: String,
    pub rpc_password: String,
    pub collateral_txid: String,
    pub collateral_vout: u32,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            rpc_endpoint: "127.0.0.1:16124".to_string(),
            rpc_user: String::new(),
            rpc_password: String::new(),
            collateral_txid: String::new(),
            collateral_vout: 0,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the orchestration loops cannot work with.
    fn check(&self) -> anyhow::Result<()> {
        if self.apps.port_min > self.apps.port_max {
            anyhow::bail!(
                "apps.port_min ({}) exceeds apps.port_max ({})",
                self.apps.port_min,
                self.apps.port_max
            );
        }
        if self.apps.max_instances < self.apps.target_instances {
            anyhow::bail!("apps.max_instances must be at least apps.target_instances");
        }
        if self.apps.cache_capacity == 0 {
            anyhow::bail!("apps.cache_capacity must be positive");
        }
        Ok(())
    }
}
