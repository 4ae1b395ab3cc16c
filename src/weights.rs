//! Weight normalization
//!
//! Turns a `ScoreMap` into a `WeightVector`:
//! - proportional weights when the scores sum to a positive value
//! - uniform `1/N` weights when every score is zero
//!
//! Output order is always the address order of the input.

use crate::scoring::ScoreMap;
use crate::types::MinerAddress;
use serde::Serialize;
use tracing::{debug, warn};

/// Normalized, address-ordered weights summing to 1.0
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WeightVector {
    weights: Vec<(MinerAddress, f64)>,
}

impl WeightVector {
    pub fn get(&self, address: &MinerAddress) -> Option<f64> {
        self.weights
            .binary_search_by(|(a, _)| a.cmp(address))
            .ok()
            .map(|idx| self.weights[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MinerAddress, f64)> {
        self.weights.iter().map(|(a, w)| (a, *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    /// Scale to the u16 on-chain representation.
    ///
    /// The largest weight maps to `u16::MAX`, the rest proportionally.
    pub fn to_chain_weights(&self) -> Vec<(MinerAddress, u16)> {
        let max = self
            .weights
            .iter()
            .map(|(_, w)| *w)
            .fold(0.0_f64, f64::max);

        self.weights
            .iter()
            .map(|(address, weight)| {
                let scaled = if max > 0.0 {
                    (weight / max * u16::MAX as f64).round() as u16
                } else {
                    0
                };
                (address.clone(), scaled)
            })
            .collect()
    }
}

/// Normalize scores into a weight vector over the same addresses.
///
/// Scores are divided by the largest score before summing, so the total
/// stays finite for any finite scores.
pub fn normalize(scores: &ScoreMap) -> WeightVector {
    if scores.is_empty() {
        return WeightVector::default();
    }

    let max = scores.iter().map(|(_, s)| s).fold(0.0_f64, f64::max);
    let scaled_total: f64 = if max > 0.0 {
        scores.iter().map(|(_, score)| score / max).sum()
    } else {
        0.0
    };

    let weights: Vec<(MinerAddress, f64)> = if scaled_total > 0.0 {
        scores
            .iter()
            .map(|(address, score)| (address.clone(), (score / max) / scaled_total))
            .collect()
    } else {
        warn!(
            miners = scores.len(),
            "No positive scores, falling back to uniform weights"
        );
        let uniform = 1.0 / scores.len() as f64;
        scores
            .iter()
            .map(|(address, _)| (address.clone(), uniform))
            .collect()
    };

    debug!(
        miners = weights.len(),
        max_score = max,
        "Normalized weights"
    );
    WeightVector { weights }
}
