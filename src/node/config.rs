//! Node configuration, loaded from TOML with CLI overrides applied on top.

use crate::runtime::EngineConfig;
use crate::storage::StorageEngine;
use crate::utils::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub storage: StorageEngine,
    /// relay bind address (host:port)
    pub rpc_addr: String,
    /// keep finalized transactions in block storage
    pub blocks: bool,
    pub queue_size: usize,
    pub log_level: String,
    pub engine: EngineConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage: StorageEngine::Memory,
            rpc_addr: "127.0.0.1:7400".to_string(),
            blocks: true,
            queue_size: 1024,
            log_level: "info".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        Self::from_toml(&data).map_err(|e| BlockchainError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        let cfg: NodeConfig = toml::from_str(data).map_err(|e| BlockchainError::ConfigError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.stamps_per_unit == 0 {
            return Err(BlockchainError::ConfigError("engine.stamps_per_unit must be positive".into()));
        }
        if self.engine.unmetered_budget == 0 {
            return Err(BlockchainError::ConfigError("engine.unmetered_budget must be positive".into()));
        }
        if self.queue_size == 0 {
            return Err(BlockchainError::ConfigError("queue_size must be positive".into()));
        }
        Ok(())
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn blocks_path(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }
}
