//! Miner Endpoint Client
//!
//! Issues one inference request to one miner and classifies the result.
//! Every failure is contained in the returned `Outcome`; nothing is retried.

use crate::types::{ErrorKind, MinerAddress, Outcome, Query};
use crate::util::sanitize_for_log;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// One request/response exchange with one miner.
///
/// Implementations must never panic on miner misbehaviour and must return
/// within roughly `timeout`.
#[async_trait]
pub trait MinerTransport: Send + Sync {
    async fn query(&self, address: &MinerAddress, query: &Query, timeout: Duration) -> Outcome;
}

#[async_trait]
impl<T: MinerTransport + ?Sized> MinerTransport for Arc<T> {
    async fn query(&self, address: &MinerAddress, query: &Query, timeout: Duration) -> Outcome {
        (**self).query(address, query, timeout).await
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    output: String,
}

/// HTTP/JSON miner client
#[derive(Clone, Debug, Default)]
pub struct MinerClient {
    client: Client,
}

impl MinerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing reqwest client (connection pool, proxy settings)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn exchange(
        &self,
        address: &MinerAddress,
        query: &Query,
        timeout: Duration,
    ) -> Result<(String, Duration), ErrorKind> {
        let url = address.endpoint().map_err(|_| ErrorKind::Unreachable)?;

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErrorKind::ServerError {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify_transport_error)?;
        let parsed: InferenceResponse =
            serde_json::from_slice(&body).map_err(|_| ErrorKind::MalformedResponse)?;
        let latency = started.elapsed();

        if parsed.output.is_empty() {
            return Err(ErrorKind::EmptyOutput);
        }

        Ok((parsed.output, latency))
    }
}

#[async_trait]
impl MinerTransport for MinerClient {
    async fn query(&self, address: &MinerAddress, query: &Query, timeout: Duration) -> Outcome {
        if timeout.is_zero() {
            return Outcome::failure(ErrorKind::Timeout);
        }

        match self.exchange(address, query, timeout).await {
            Ok((output, latency)) => {
                debug!(
                    miner = %address,
                    latency_ms = latency.as_millis() as u64,
                    output = %sanitize_for_log(&output),
                    "Miner responded"
                );
                Outcome::success(output, latency)
            }
            Err(reason) => {
                debug!(miner = %address, %reason, "Miner query failed");
                Outcome::failure(reason)
            }
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_decode() {
        ErrorKind::MalformedResponse
    } else {
        ErrorKind::Unreachable
    }
}
