use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;
use serde::Deserialize;

use unirep_state::domain::settings::Settings;
use unirep_state::indexer::{IndexerOptions, DEFAULT_BATCH_SIZE};

/// Top-level indexer configuration loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct IndexerConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub indexer: IndexerSection,
    /// Protocol parameters the deployed contract was created with.
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub unirep_address: Address,
    /// Block the Unirep contract was deployed in. Replay starts here.
    pub deployment_block: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndexerSection {
    pub batch_size: u64,
    /// Delay between head polls once caught up (e.g. "4s", "500ms").
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Snapshot written after every batch. No persistence when absent.
    pub state_file: Option<PathBuf>,
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(4),
            state_file: None,
        }
    }
}

impl IndexerSection {
    pub fn options(&self) -> IndexerOptions {
        IndexerOptions {
            batch_size: self.batch_size,
            poll_interval: self.poll_interval,
            state_file: self.state_file.clone(),
        }
    }
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl IndexerConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.unirep_address == Address::ZERO {
            return Err(ConfigError::Validation(
                "chain.unirep_address must not be the zero address".into(),
            ));
        }
        if self.indexer.batch_size == 0 {
            return Err(ConfigError::Validation(
                "indexer.batch_size must be at least 1".into(),
            ));
        }
        if self.indexer.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "indexer.poll_interval must be positive".into(),
            ));
        }
        self.settings
            .validate()
            .map_err(|e| ConfigError::Validation(format!("settings: {e}")))
    }
}
