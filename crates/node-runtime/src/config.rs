//! # Node Configuration
//!
//! A TOML file deserialized into a typed tree with sane defaults per
//! section. Only `network`, `data_dir`, and the P2P bind endpoint are
//! required; everything else has a default.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown network {0:?}")]
    UnknownNetwork(String),

    #[error("{0}")]
    Invalid(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Chain id by name: `devnet`, `testnet`, or `mainnet`.
    pub network: String,
    /// Root directory for all persistent state.
    pub data_dir: PathBuf,
    /// Path to the node identity key file; relative paths resolve under
    /// `data_dir`.
    #[serde(default = "default_identity_file")]
    pub node_identity_file: PathBuf,

    #[serde(default)]
    pub p2p: P2pSection,
    #[serde(default)]
    pub directory: DirectorySection,
    #[serde(default)]
    pub mempool: MempoolSection,
    #[serde(default)]
    pub mining: MiningSection,
}

fn default_identity_file() -> PathBuf {
    PathBuf::from(".node_identity")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct P2pSection {
    pub host: String,
    pub port: u16,
    pub max_peers: usize,
    /// Accept loopback and private peer addresses; development only.
    pub allow_private_addresses: bool,
}

impl Default for P2pSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 30_384,
            max_peers: 32,
            allow_private_addresses: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    /// Registry base URL; empty disables the directory.
    pub host: String,
    pub ping_interval_ms: u64,
    pub disable: bool,
    /// Hex address of the directory's pinned signing identity.
    pub identity: String,
    /// Fixed `host:port` peers dialed regardless of the directory.
    pub manual_peers: Vec<String>,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            host: String::new(),
            ping_interval_ms: 30_000,
            disable: false,
            identity: String::new(),
            manual_peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MempoolSection {
    pub min_acceptable_fee: u64,
    pub max_bytes: u64,
    pub max_count: usize,
    pub ttl_ms: u64,
}

impl Default for MempoolSection {
    fn default() -> Self {
        let defaults = ember_mempool::MempoolConfig::default();
        Self {
            min_acceptable_fee: defaults.min_acceptable_fee,
            max_bytes: defaults.max_bytes,
            max_count: defaults.max_count,
            ttl_ms: defaults.ttl_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MiningSection {
    pub enabled: bool,
    /// Zero means one worker per core not reserved for the node.
    pub threads: usize,
    /// Hex coinbase address; empty pays the node identity.
    pub coinbase: String,
}

impl NodeConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let config: NodeConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if shared_types::NetworkSettings::by_name(&self.network).is_none() {
            return Err(ConfigError::UnknownNetwork(self.network.clone()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must be set".to_string()));
        }
        if !self.directory.disable
            && !self.directory.host.is_empty()
            && self.directory.identity.is_empty()
        {
            return Err(ConfigError::Invalid(
                "directory.identity must be set when the directory is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// The identity file path, resolved under the data directory.
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        if self.node_identity_file.is_absolute() {
            self.node_identity_file.clone()
        } else {
            self.data_dir.join(&self.node_identity_file)
        }
    }
}
