//! Validator - runs sampling-and-weighting rounds
//!
//! One round:
//! 1. Discover the miner set
//! 2. Fan the query out to every miner
//! 3. Score each outcome
//! 4. Normalize scores into a weight vector
//! 5. Hand the vector to the chain collaborator
//!
//! Nothing is carried from one round to the next.

use crate::chain::{ChainClient, DryRunChain, RpcChainClient};
use crate::config::ValidatorConfig;
use crate::discovery::{MinerDiscovery, RegistryDiscovery, StaticDiscovery};
use crate::dispatch::{DispatchCoordinator, RoundTimeouts};
use crate::error::{ChainError, ConfigError, ValidatorError};
use crate::miner_client::{MinerClient, MinerTransport};
use crate::scoring::{ScoreMap, ScoringStrategy};
use crate::types::{Outcome, Query, RoundOutcomes};
use crate::util::sanitize_for_log;
use crate::weights::{normalize, WeightVector};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of handing the weight vector to the chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Failed { reason: String },
}

/// Everything one round produced
#[derive(Clone, Debug, Serialize)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub block: Option<u64>,
    pub query: Query,
    pub outcomes: RoundOutcomes,
    pub scores: ScoreMap,
    pub weights: WeightVector,
    pub submission: SubmissionStatus,
}

/// Per-round settings that do not change between rounds
#[derive(Clone, Debug)]
pub struct RoundSettings {
    pub query: Query,
    pub timeouts: RoundTimeouts,
    pub validator_id: String,
}

pub struct Validator {
    coordinator: DispatchCoordinator<Arc<dyn MinerTransport>>,
    discovery: Arc<dyn MinerDiscovery>,
    chain: Arc<dyn ChainClient>,
    strategy: Box<dyn ScoringStrategy>,
    settings: RoundSettings,
}

impl Validator {
    pub fn new(
        transport: Arc<dyn MinerTransport>,
        discovery: Arc<dyn MinerDiscovery>,
        chain: Arc<dyn ChainClient>,
        strategy: Box<dyn ScoringStrategy>,
        settings: RoundSettings,
    ) -> Self {
        Self {
            coordinator: DispatchCoordinator::new(transport),
            discovery,
            chain,
            strategy,
            settings,
        }
    }

    /// Wire up the HTTP collaborators described by `config`.
    ///
    /// With `dry_run` or no chain endpoint, weights go to a `DryRunChain`.
    pub fn from_config(config: &ValidatorConfig, dry_run: bool) -> Result<Self, ConfigError> {
        config.validate()?;

        let discovery: Arc<dyn MinerDiscovery> = match &config.registry_url {
            Some(url) => Arc::new(RegistryDiscovery::new(url.clone())),
            None => Arc::new(StaticDiscovery::new(config.miner_addresses()?)),
        };

        let chain: Arc<dyn ChainClient> = match (&config.chain.endpoint, dry_run) {
            (Some(endpoint), false) => Arc::new(
                RpcChainClient::new(
                    endpoint.clone(),
                    Duration::from_secs(config.chain.rpc_timeout_secs),
                )
                .map_err(|e: ChainError| ConfigError::Invalid(e.to_string()))?,
            ),
            _ => Arc::new(DryRunChain::new()),
        };

        Ok(Self::new(
            Arc::new(MinerClient::new()),
            discovery,
            chain,
            config.scoring.build(),
            RoundSettings {
                query: config.query(),
                timeouts: config.timeouts(),
                validator_id: config.chain.validator_id.clone(),
            },
        ))
    }

    pub fn settings(&self) -> &RoundSettings {
        &self.settings
    }

    /// Run a single round.
    ///
    /// Fails only when discovery fails or the round preconditions are
    /// violated. Miner failures and chain failures are recorded in the report.
    pub async fn run_once(&self) -> Result<RoundReport, ValidatorError> {
        let round_id = Uuid::new_v4();
        let started_at = Utc::now();

        let miners = self.discovery.miners().await?;
        info!(
            %round_id,
            miners = miners.len(),
            strategy = self.strategy.name(),
            "Starting validation round"
        );

        let outcomes = self
            .coordinator
            .run_round(&miners, &self.settings.query, self.settings.timeouts)
            .await?;

        for (address, outcome) in outcomes.iter() {
            match outcome {
                Outcome::Success { output, latency } => debug!(
                    %round_id,
                    miner = %address,
                    latency_ms = latency.as_millis() as u64,
                    output = %sanitize_for_log(output),
                    "Received response"
                ),
                Outcome::Failure { reason } => {
                    info!(%round_id, miner = %address, %reason, "Miner failed")
                }
            }
        }
        if outcomes.success_count() == 0 {
            warn!(
                %round_id,
                miners = outcomes.len(),
                "No successful miner responses this round"
            );
        }

        let scores = ScoreMap::from_outcomes(&outcomes, self.strategy.as_ref());
        let weights = normalize(&scores);
        for (address, weight) in weights.iter() {
            info!(%round_id, miner = %address, weight, "Computed weight");
        }

        let block = match self.chain.current_block().await {
            Ok(block) => Some(block),
            Err(e) => {
                warn!(%round_id, "Failed to read current block: {}", e);
                None
            }
        };

        let submission = match self
            .chain
            .submit_weights(&self.settings.validator_id, &weights)
            .await
        {
            Ok(()) => SubmissionStatus::Submitted,
            Err(e) => {
                error!(%round_id, "Weight submission failed: {}", e);
                SubmissionStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Ok(RoundReport {
            round_id,
            started_at,
            block,
            query: self.settings.query.clone(),
            outcomes,
            scores,
            weights,
            submission,
        })
    }

    /// True when submissions stay in memory
    pub fn is_dry_run(&self) -> bool {
        self.chain.is_dry_run()
    }

    /// Run rounds every `interval` until `shutdown` resolves.
    ///
    /// A failing round is logged and the loop carries on. Shutdown also
    /// abandons a round in progress. Returns the number of rounds that
    /// completed.
    pub async fn run<F>(&self, interval: Duration, shutdown: F) -> Result<usize, ValidatorError>
    where
        F: Future<Output = ()>,
    {
        if interval.is_zero() {
            return Err(ValidatorError::ZeroInterval);
        }
        info!(
            interval_secs = interval.as_secs(),
            validator = %self.settings.validator_id,
            "Validator loop starting"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut completed = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(completed, "Shutdown requested, stopping validator loop");
                    break;
                }
                _ = ticker.tick() => {
                    let result = tokio::select! {
                        _ = &mut shutdown => {
                            info!(completed, "Shutdown requested, abandoning round in progress");
                            break;
                        }
                        result = self.run_once() => result,
                    };
                    match result {
                        Ok(report) => {
                            completed += 1;
                            info!(
                                round_id = %report.round_id,
                                succeeded = report.outcomes.success_count(),
                                failed = report.outcomes.failure_count(),
                                "Validation round finished"
                            );
                        }
                        Err(e) => error!("Validation round failed: {}", e),
                    }
                }
            }
        }
        Ok(completed)
    }
}
