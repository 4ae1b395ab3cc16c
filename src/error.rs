//! Error types for the validator

use std::time::Duration;
use thiserror::Error;

/// Rejected miner address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Miner address is empty")]
    Empty,

    #[error("Miner address {0} has no port")]
    MissingPort(String),

    #[error("Miner address {0} has no host")]
    MissingHost(String),

    #[error("Miner address {address} has invalid port: {port}")]
    InvalidPort { address: String, port: String },

    #[error("Miner address {address} uses unsupported scheme: {scheme}")]
    UnsupportedScheme { address: String, scheme: String },

    #[error("Miner address {address} is not a valid URI: {reason}")]
    InvalidUri { address: String, reason: String },
}

/// Precondition violations that abort a round before any miner is queried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoundError {
    #[error("No miners to query")]
    NoMiners,

    #[error("Per-miner timeout must be positive")]
    ZeroMinerTimeout,

    #[error("Round deadline must be positive")]
    ZeroRoundDeadline,

    #[error("Per-miner timeout {per_miner:?} exceeds round deadline {round_deadline:?}")]
    TimeoutExceedsDeadline {
        per_miner: Duration,
        round_deadline: Duration,
    },
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid miner address: {0}")]
    Address(#[from] AddressError),

    #[error("Invalid round settings: {0}")]
    Round(#[from] RoundError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the chain submission collaborator
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Chain request failed: {0}")]
    Transport(String),

    #[error("Chain returned HTTP status {0}")]
    Status(u16),

    #[error("Chain RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected chain response: {0}")]
    InvalidResponse(String),

    #[error("Weight submission rejected")]
    Rejected,
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::InvalidResponse(err.to_string())
    }
}

/// Errors from the miner discovery collaborator
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to connect to miner registry: {0}")]
    Connection(String),

    #[error("Miner registry returned HTTP status {0}")]
    Status(u16),

    #[error("Failed to parse miner list: {0}")]
    Parse(String),
}

/// Errors that abort one validator round
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Miner discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Round rejected: {0}")]
    Round(#[from] RoundError),

    #[error("Round interval must be positive")]
    ZeroInterval,
}
