//! Scoring engine
//!
//! Maps each round outcome to a non-negative score through a pluggable
//! `ScoringStrategy`. Strategies are pure: the same outcome always yields the
//! same score, which keeps the weight vector reproducible.

use crate::types::{MinerAddress, Outcome, RoundOutcomes};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Score given to every failed outcome
pub const MIN_SCORE: f64 = 0.0;

/// Scoring capability selected at configuration time
pub trait ScoringStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn score(&self, outcome: &Outcome) -> f64;
}

/// Scores a response by its length in characters
#[derive(Clone, Copy, Debug, Default)]
pub struct LengthScorer;

impl ScoringStrategy for LengthScorer {
    fn name(&self) -> &'static str {
        "length"
    }

    fn score(&self, outcome: &Outcome) -> f64 {
        match outcome {
            Outcome::Success { output, .. } => output.chars().count() as f64,
            Outcome::Failure { .. } => MIN_SCORE,
        }
    }
}

/// 1.0 for any response, 0.0 for failures
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryScorer;

impl ScoringStrategy for BinaryScorer {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn score(&self, outcome: &Outcome) -> f64 {
        if outcome.is_success() {
            1.0
        } else {
            MIN_SCORE
        }
    }
}

/// Strategy names accepted by config files and the CLI
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScoringStrategyKind {
    #[default]
    Length,
    Binary,
}

impl ScoringStrategyKind {
    pub fn build(self) -> Box<dyn ScoringStrategy> {
        match self {
            ScoringStrategyKind::Length => Box::new(LengthScorer),
            ScoringStrategyKind::Binary => Box::new(BinaryScorer),
        }
    }
}

impl fmt::Display for ScoringStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringStrategyKind::Length => write!(f, "length"),
            ScoringStrategyKind::Binary => write!(f, "binary"),
        }
    }
}

/// Per-round scores keyed by address, in address order.
///
/// Built once and never mutated.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScoreMap {
    scores: BTreeMap<MinerAddress, f64>,
}

impl ScoreMap {
    /// Score every outcome of a round
    pub fn from_outcomes(outcomes: &RoundOutcomes, strategy: &dyn ScoringStrategy) -> Self {
        Self::from_scores(outcomes.iter().map(|(address, outcome)| {
            let score = match outcome {
                Outcome::Success { .. } => strategy.score(outcome),
                Outcome::Failure { .. } => MIN_SCORE,
            };
            (address.clone(), score)
        }))
    }

    /// Build from raw scores; negative or non-finite values become `MIN_SCORE`
    pub fn from_scores(scores: impl IntoIterator<Item = (MinerAddress, f64)>) -> Self {
        let scores = scores
            .into_iter()
            .map(|(address, score)| {
                if score.is_finite() && score >= 0.0 {
                    (address, score)
                } else {
                    warn!(miner = %address, score, "Discarding invalid score");
                    (address, MIN_SCORE)
                }
            })
            .collect();
        Self { scores }
    }

    pub fn get(&self, address: &MinerAddress) -> Option<f64> {
        self.scores.get(address).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MinerAddress, f64)> {
        self.scores.iter().map(|(a, s)| (a, *s))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Sum of all scores, accumulated in address order
    pub fn total(&self) -> f64 {
        self.scores.values().sum()
    }
}
