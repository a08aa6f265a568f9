//! Chain configuration.

use crate::mempool::MempoolConfig;
use powchain_consensus::PowConfig;
use powchain_core::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default number of leading zero bits a block hash needs.
pub const DEFAULT_DIFFICULTY: u8 = 22;

/// Default coinbase reward per included transaction.
pub const DEFAULT_REWARD_PER_TX: u64 = 10;

/// Errors reading or writing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Chain parameters, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Leading zero bits required of every block hash.
    pub difficulty: u8,
    /// Coinbase reward per non-coinbase transaction in a block.
    pub reward_per_tx: u64,
    /// Address paid by blocks this node mines.
    pub miner_address: Option<Address>,
    /// Public key allowed to mint without spending outputs.
    pub privileged_key: Option<Address>,
    pub pow: PowConfig,
    pub mempool: MempoolConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            reward_per_tx: DEFAULT_REWARD_PER_TX,
            miner_address: None,
            privileged_key: None,
            pow: PowConfig::default(),
            mempool: MempoolConfig::default(),
        }
    }
}

impl ChainConfig {
    /// Read a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
