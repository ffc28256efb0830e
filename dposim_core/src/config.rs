//! Simulator configuration.
//!
//! Loaded from TOML. Every player starts from the same base file; the
//! simulator then overrides the miner keys and the chain database path per
//! player before handing the config to the node.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainConfig,
    pub network: NetworkConfig,
    pub delegate: DelegateConfig,
    pub consensus: ConsensusConfig,
    pub txpool: TxPoolConfig,
    pub block_sync: BlockSyncConfig,
}

/// Chain storage and miner identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Ledger database location
    pub chain_db_path: PathBuf,

    /// Remove the database when the ledger is dropped
    pub in_memory: bool,

    /// Timestamp of the genesis block (ms since Unix epoch)
    pub genesis_timestamp_ms: u64,

    /// Key material of the local producer
    pub miner: MinerConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_db_path: PathBuf::from("./chain.db"),
            in_memory: true,
            genesis_timestamp_ms: 1_704_067_200_000, // 2024-01-01 00:00:00 UTC
            miner: MinerConfig::default(),
        }
    }
}

/// Hex-encoded producer key pair and its derived address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub public_key: String,
    pub private_key: String,
    pub raw_address: String,
}

/// Peer overlay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Static peer addresses
    pub peers: Vec<String>,

    /// Upper bound on packets held in a player's outbound queue
    pub max_outbound_queue: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            max_outbound_queue: 1024,
        }
    }
}

/// Delegate (validator) membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Fixed delegate addresses, in proposer rotation order
    pub addrs: Vec<String>,

    /// Use the addresses of the players created by the same Init call
    /// instead of `addrs`
    pub from_players: bool,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            addrs: Vec::new(),
            from_players: true,
        }
    }
}

/// RollDPoS timing and block limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Consensus scheme name; only "ROLLDPOS" is supported
    pub scheme: String,

    /// Minimum time in a round before a timer tick forces a view change
    pub round_timeout_ms: u64,

    /// Background round timer period; 0 disables it
    pub propose_interval_ms: u64,

    /// Maximum transfers packed into a proposed block
    pub max_transfers_per_block: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            scheme: "ROLLDPOS".to_string(),
            round_timeout_ms: 0,
            propose_interval_ms: 0,
            max_transfers_per_block: 100,
        }
    }
}

impl ConsensusConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    /// Period of the background round timer, if enabled.
    pub fn propose_interval(&self) -> Option<Duration> {
        (self.propose_interval_ms > 0).then(|| Duration::from_millis(self.propose_interval_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxPoolConfig {
    pub max_size: usize,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self { max_size: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSyncConfig {
    /// Future blocks held while waiting for the gap to fill
    pub buffer_size: usize,
}

impl Default for BlockSyncConfig {
    fn default() -> Self {
        Self { buffer_size: 16 }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_without_validation(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file without checking its contents.
    pub fn load_without_validation<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consensus.scheme != "ROLLDPOS" {
            return Err(ConfigError::Invalid(format!(
                "unsupported consensus scheme '{}'",
                self.consensus.scheme
            )));
        }
        if !self.delegate.from_players && self.delegate.addrs.is_empty() {
            return Err(ConfigError::Invalid(
                "delegate.addrs is empty and delegate.from_players is false".to_string(),
            ));
        }
        if self.consensus.max_transfers_per_block == 0 {
            return Err(ConfigError::Invalid(
                "consensus.max_transfers_per_block must be positive".to_string(),
            ));
        }
        if self.txpool.max_size == 0 {
            return Err(ConfigError::Invalid("txpool.max_size must be positive".to_string()));
        }
        if self.block_sync.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "block_sync.buffer_size must be positive".to_string(),
            ));
        }
        if self.network.max_outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "network.max_outbound_queue must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
