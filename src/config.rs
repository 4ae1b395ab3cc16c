//! Validator Configuration
//!
//! Explicit settings passed into the validator, loaded from an optional TOML
//! file and then overridden by command-line flags:
//! - Miner list or registry URL
//! - Query sent each round
//! - Per-miner timeout and round deadline
//! - Scoring strategy
//! - Chain endpoint and validator identity

use crate::dispatch::RoundTimeouts;
use crate::error::{AddressError, ConfigError, RoundError};
use crate::scoring::ScoringStrategyKind;
use crate::types::{MinerAddress, Query};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted when no config path is given
pub const CONFIG_PATH_ENV: &str = "NEUROMESH_CONFIG";

/// Complete validator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Static miner list (`host:port` or URI)
    pub miners: Vec<String>,
    /// Registry to discover miners from; takes precedence over `miners`
    pub registry_url: Option<String>,
    /// Inference prompt sent to every miner
    pub query: String,
    /// Bound on a single miner query
    pub per_miner_timeout_ms: u64,
    /// Bound on a whole round
    pub round_deadline_ms: u64,
    /// Pause between rounds in loop mode
    pub round_interval_secs: u64,
    /// Scoring strategy
    pub scoring: ScoringStrategyKind,
    /// Chain settings
    pub chain: ChainConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            miners: vec!["127.0.0.1:5000".to_string()],
            registry_url: None,
            query: "What is 2+2?".to_string(),
            per_miner_timeout_ms: 10_000,
            round_deadline_ms: 30_000,
            round_interval_secs: 60,
            scoring: ScoringStrategyKind::default(),
            chain: ChainConfig::default(),
        }
    }
}

/// Chain submission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint; weights are only logged when absent
    pub endpoint: Option<String>,
    /// Identity the weights are submitted under
    pub validator_id: String,
    /// Timeout for chain RPC calls
    pub rpc_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            validator_id: "validator".to_string(),
            rpc_timeout_secs: 30,
        }
    }
}

impl ValidatorConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from `path`, else from `$NEUROMESH_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(env_path) if !env_path.is_empty() => Self::from_file(Path::new(&env_path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn timeouts(&self) -> RoundTimeouts {
        RoundTimeouts::new(
            Duration::from_millis(self.per_miner_timeout_ms),
            Duration::from_millis(self.round_deadline_ms),
        )
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval_secs)
    }

    pub fn query(&self) -> Query {
        Query::new(self.query.clone())
    }

    pub fn miner_addresses(&self) -> Result<Vec<MinerAddress>, AddressError> {
        self.miners.iter().map(|m| MinerAddress::parse(m)).collect()
    }

    /// Reject settings that would make every round fail its preconditions
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts().validate()?;

        let miners = self.miner_addresses()?;
        if miners.is_empty() && self.registry_url.is_none() {
            return Err(RoundError::NoMiners.into());
        }
        if self.round_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "round_interval_secs must be positive".to_string(),
            ));
        }
        if self.chain.validator_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "chain.validator_id must not be empty".to_string(),
            ));
        }
        if self.chain.rpc_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "chain.rpc_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
