//! NeuroMesh validator
//!
//! Each round the validator samples every known miner with the same query,
//! scores the responses and turns the scores into a normalized weight vector
//! for the chain.
//!
//! ## Module Structure
//!
//! - `types`: Round-scoped data model (addresses, queries, outcomes)
//! - `miner_client`: HTTP transport to a single miner
//! - `dispatch`: Concurrent fan-out with per-miner and round timeouts
//! - `scoring`: Pluggable scoring strategies
//! - `weights`: Score to weight normalization
//! - `chain`: Block reads and weight submission
//! - `discovery`: Static and registry-backed miner lists
//! - `validator`: Round orchestration and the periodic loop
//! - `config`: TOML configuration
//! - `miner`: Reference miner server

/// Shared utility functions
pub mod util;

pub mod chain;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod miner;
pub mod miner_client;
pub mod scoring;
pub mod types;
pub mod validator;
pub mod weights;

pub use chain::{ChainClient, DryRunChain, RecordedSubmission, RpcChainClient};
pub use config::{ChainConfig, ValidatorConfig};
pub use discovery::{MinerDiscovery, RegistryDiscovery, StaticDiscovery};
pub use dispatch::{DispatchCoordinator, RoundTimeouts};
pub use error::{
    AddressError, ChainError, ConfigError, DiscoveryError, RoundError, ValidatorError,
};
pub use miner_client::{MinerClient, MinerTransport};
pub use scoring::{BinaryScorer, LengthScorer, ScoreMap, ScoringStrategy, ScoringStrategyKind};
pub use types::{ErrorKind, MinerAddress, Outcome, Query, RoundOutcomes};
pub use validator::{RoundReport, RoundSettings, SubmissionStatus, Validator};
pub use weights::{normalize, WeightVector};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
