//! Dispatch Coordinator
//!
//! Fans one query out to every miner of the round concurrently and collects
//! exactly one `Outcome` per address.
//!
//! # Slot arena
//! Addresses are sorted and each gets a fixed index. Query futures resolve to
//! `(index, Outcome)` and only the collecting loop writes into the slot
//! vector, so every slot is written at most once and no lock is needed.
//!
//! # Deadlines
//! - each query is bounded by `per_miner`
//! - the whole round is bounded by `round_deadline`; queries still pending at
//!   the deadline are dropped and recorded as `Failure { Timeout }`

use crate::error::RoundError;
use crate::miner_client::MinerTransport;
use crate::types::{ErrorKind, MinerAddress, Outcome, Query, RoundOutcomes};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default per-miner timeout
pub const DEFAULT_MINER_TIMEOUT: Duration = Duration::from_secs(10);

/// Default round deadline
pub const DEFAULT_ROUND_DEADLINE: Duration = Duration::from_secs(30);

/// The two independent time bounds of a round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTimeouts {
    pub per_miner: Duration,
    pub round_deadline: Duration,
}

impl Default for RoundTimeouts {
    fn default() -> Self {
        Self {
            per_miner: DEFAULT_MINER_TIMEOUT,
            round_deadline: DEFAULT_ROUND_DEADLINE,
        }
    }
}

impl RoundTimeouts {
    pub fn new(per_miner: Duration, round_deadline: Duration) -> Self {
        Self {
            per_miner,
            round_deadline,
        }
    }

    /// Both bounds positive and `per_miner <= round_deadline`
    pub fn validate(&self) -> Result<(), RoundError> {
        if self.per_miner.is_zero() {
            return Err(RoundError::ZeroMinerTimeout);
        }
        if self.round_deadline.is_zero() {
            return Err(RoundError::ZeroRoundDeadline);
        }
        if self.per_miner > self.round_deadline {
            return Err(RoundError::TimeoutExceedsDeadline {
                per_miner: self.per_miner,
                round_deadline: self.round_deadline,
            });
        }
        Ok(())
    }
}

/// Concurrent fan-out over one `MinerTransport`
pub struct DispatchCoordinator<T> {
    transport: T,
}

impl<T: MinerTransport> DispatchCoordinator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Query every address once and return one outcome per distinct address.
    ///
    /// Only precondition violations are returned as errors; individual miner
    /// failures are recorded in the outcomes.
    pub async fn run_round(
        &self,
        addresses: &[MinerAddress],
        query: &Query,
        timeouts: RoundTimeouts,
    ) -> Result<RoundOutcomes, RoundError> {
        if addresses.is_empty() {
            return Err(RoundError::NoMiners);
        }
        timeouts.validate()?;

        let mut ordered = addresses.to_vec();
        ordered.sort();
        ordered.dedup();
        if ordered.len() != addresses.len() {
            debug!(
                requested = addresses.len(),
                distinct = ordered.len(),
                "Collapsed duplicate miner addresses"
            );
        }

        let started = Instant::now();
        let deadline = started + timeouts.round_deadline;
        let per_miner = timeouts.per_miner;

        let mut slots: Vec<Option<Outcome>> = vec![None; ordered.len()];
        let mut pending: FuturesUnordered<_> = ordered
            .iter()
            .enumerate()
            .map(|(index, address)| async move {
                let call = self.transport.query(address, query, per_miner);
                let outcome = tokio::time::timeout(per_miner, call)
                    .await
                    .unwrap_or_else(|_| Outcome::failure(ErrorKind::Timeout));
                (index, outcome)
            })
            .collect();

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, outcome))) => {
                    debug_assert!(slots[index].is_none());
                    slots[index] = Some(outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = pending.len(),
                        deadline_ms = timeouts.round_deadline.as_millis() as u64,
                        "Round deadline elapsed, abandoning pending miners"
                    );
                    break;
                }
            }
        }
        // Dropping the stream cancels every query that has not finished
        drop(pending);

        let entries: Vec<(MinerAddress, Outcome)> = ordered
            .into_iter()
            .zip(slots)
            .map(|(address, slot)| {
                let outcome = slot.unwrap_or_else(|| Outcome::failure(ErrorKind::Timeout));
                (address, outcome)
            })
            .collect();
        let outcomes = RoundOutcomes::from_sorted(entries);

        info!(
            miners = outcomes.len(),
            succeeded = outcomes.success_count(),
            failed = outcomes.failure_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Round dispatch complete"
        );

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Replies after a fixed delay with a canned outcome; unknown miners hang
    #[derive(Default)]
    struct ScriptedTransport {
        script: HashMap<String, (Duration, Outcome)>,
        calls: AtomicUsize,
        completed: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn reply(mut self, address: &str, delay_ms: u64, outcome: Outcome) -> Self {
            self.script.insert(
                address.to_string(),
                (Duration::from_millis(delay_ms), outcome),
            );
            self
        }
    }

    #[async_trait]
    impl MinerTransport for ScriptedTransport {
        async fn query(&self, address: &MinerAddress, _query: &Query, _timeout: Duration) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, outcome) = self
                .script
                .get(address.as_str())
                .cloned()
                .unwrap_or((Duration::from_secs(3600), Outcome::failure(ErrorKind::Unreachable)));
            tokio::time::sleep(delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            outcome
        }
    }

    fn addrs(list: &[&str]) -> Vec<MinerAddress> {
        list.iter().map(|s| MinerAddress::parse(s).unwrap()).collect()
    }

    fn ok(output: &str) -> Outcome {
        Outcome::success(output, Duration::from_millis(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_outcome_per_address_for_mixed_results() {
        let transport = ScriptedTransport::default()
            .reply("a:1", 10, ok("4"))
            .reply("b:1", 20, Outcome::failure(ErrorKind::ServerError { status: 500 }))
            .reply("c:1", 5, Outcome::failure(ErrorKind::Unreachable))
            .reply("d:1", 1, Outcome::failure(ErrorKind::MalformedResponse));
        let coordinator = DispatchCoordinator::new(transport);
        let miners = addrs(&["d:1", "c:1", "b:1", "a:1", "e:1"]);

        let outcomes = coordinator
            .run_round(
                &miners,
                &Query::new("2+2"),
                RoundTimeouts::new(Duration::from_secs(1), Duration::from_secs(2)),
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), miners.len());
        let order: Vec<&str> = outcomes.addresses().map(|a| a.as_str()).collect();
        assert_eq!(order, vec!["a:1", "b:1", "c:1", "d:1", "e:1"]);
        assert!(outcomes.get(&miners[3]).unwrap().is_success());
        assert_eq!(
            outcomes.get(&miners[4]).unwrap().error_kind(),
            Some(ErrorKind::Timeout)
        );
        assert_eq!(coordinator.transport().calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_miner_does_not_delay_others() {
        let transport = ScriptedTransport::default()
            .reply("fast-a:1", 50, ok("one"))
            .reply("fast-b:1", 80, ok("two"));
        let coordinator = DispatchCoordinator::new(transport);
        let miners = addrs(&["fast-a:1", "fast-b:1", "hung:1"]);

        let started = Instant::now();
        let outcomes = coordinator
            .run_round(
                &miners,
                &Query::new("q"),
                RoundTimeouts::new(Duration::from_secs(1), Duration::from_secs(5)),
            )
            .await
            .unwrap();

        // Bounded by the per-miner timeout of the hung miner, not the deadline
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcomes.get(&miners[0]), Some(&ok("one")));
        assert_eq!(outcomes.get(&miners[1]), Some(&ok("two")));
        assert_eq!(
            outcomes.get(&miners[2]).unwrap().error_kind(),
            Some(ErrorKind::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_run_concurrently() {
        let mut transport = ScriptedTransport::default();
        let names: Vec<String> = (0..8).map(|i| format!("m{}:1", i)).collect();
        for name in &names {
            transport = transport.reply(name, 100, ok("x"));
        }
        let coordinator = DispatchCoordinator::new(transport);
        let miners: Vec<MinerAddress> = names
            .iter()
            .map(|n| MinerAddress::parse(n).unwrap())
            .collect();

        let started = Instant::now();
        let outcomes = coordinator
            .run_round(&miners, &Query::new("q"), RoundTimeouts::default())
            .await
            .unwrap();

        assert_eq!(outcomes.success_count(), 8);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_responses_never_land_after_deadline() {
        let transport = ScriptedTransport::default()
            .reply("quick:1", 10, ok("done"))
            .reply("slow:1", 3_000, ok("too late"));
        let completed = transport.completed.clone();
        let coordinator = DispatchCoordinator::new(transport);
        let miners = addrs(&["quick:1", "slow:1"]);

        let outcomes = coordinator
            .run_round(
                &miners,
                &Query::new("q"),
                RoundTimeouts::new(Duration::from_secs(1), Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(
            outcomes.get(&miners[1]).unwrap().error_kind(),
            Some(ErrorKind::Timeout)
        );

        // The abandoned query must not complete in the background
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes.get(&miners[1]).unwrap().error_kind(),
            Some(ErrorKind::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_addresses_are_queried_once() {
        let transport = ScriptedTransport::default()
            .reply("a:1", 1, ok("a"))
            .reply("b:1", 1, ok("b"));
        let coordinator = DispatchCoordinator::new(transport);

        let outcomes = coordinator
            .run_round(
                &addrs(&["b:1", "a:1", "b:1"]),
                &Query::new("q"),
                RoundTimeouts::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(coordinator.transport().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_preconditions_rejected() {
        let coordinator = DispatchCoordinator::new(ScriptedTransport::default());
        let query = Query::new("q");
        let miners = addrs(&["a:1"]);

        assert_eq!(
            coordinator
                .run_round(&[], &query, RoundTimeouts::default())
                .await
                .unwrap_err(),
            RoundError::NoMiners
        );
        assert_eq!(
            coordinator
                .run_round(
                    &miners,
                    &query,
                    RoundTimeouts::new(Duration::ZERO, Duration::from_secs(1))
                )
                .await
                .unwrap_err(),
            RoundError::ZeroMinerTimeout
        );
        assert_eq!(
            coordinator
                .run_round(
                    &miners,
                    &query,
                    RoundTimeouts::new(Duration::from_secs(1), Duration::ZERO)
                )
                .await
                .unwrap_err(),
            RoundError::ZeroRoundDeadline
        );
        assert!(matches!(
            coordinator
                .run_round(
                    &miners,
                    &query,
                    RoundTimeouts::new(Duration::from_secs(5), Duration::from_secs(1))
                )
                .await
                .unwrap_err(),
            RoundError::TimeoutExceedsDeadline { .. }
        ));
        assert_eq!(coordinator.transport().calls.load(Ordering::SeqCst), 0);
    }
}
