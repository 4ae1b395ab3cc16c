//! Chain submission collaborator
//!
//! The validator only needs two calls from the chain: read the current block
//! and submit a weight vector. `RpcChainClient` speaks Substrate-style
//! JSON-RPC 2.0 over HTTP; `DryRunChain` keeps everything in memory.

use crate::error::ChainError;
use crate::types::MinerAddress;
use crate::weights::WeightVector;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// JSON-RPC method used to submit weights
pub const SET_WEIGHTS_METHOD: &str = "neuromesh_setWeights";

/// JSON-RPC method used to read the best block header
pub const GET_HEADER_METHOD: &str = "chain_getHeader";

/// Default timeout for chain RPC calls
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current best block number
    async fn current_block(&self) -> Result<u64, ChainError>;

    /// Write a weight vector on behalf of `validator_id`
    async fn submit_weights(
        &self,
        validator_id: &str,
        weights: &WeightVector,
    ) -> Result<(), ChainError>;

    /// True when weights never leave the process
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC chain client
pub struct RpcChainClient {
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcChainClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!(method, id = request.id, "Chain RPC call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChainError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let rpc: JsonRpcResponse = serde_json::from_slice(&body)?;

        if let Some(err) = rpc.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        rpc.result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn current_block(&self) -> Result<u64, ChainError> {
        let header = self.call(GET_HEADER_METHOD, json!([])).await?;
        parse_block_number(&header["number"])
    }

    async fn submit_weights(
        &self,
        validator_id: &str,
        weights: &WeightVector,
    ) -> Result<(), ChainError> {
        let entries: Vec<(String, u16)> = weights
            .to_chain_weights()
            .into_iter()
            .map(|(address, weight)| (address.to_string(), weight))
            .collect();

        let result = self
            .call(SET_WEIGHTS_METHOD, json!([validator_id, entries]))
            .await?;

        match result.as_bool() {
            Some(true) => {
                info!(validator = validator_id, miners = entries.len(), "Weights submitted");
                Ok(())
            }
            Some(false) => Err(ChainError::Rejected),
            None => Err(ChainError::InvalidResponse(format!(
                "unexpected {} result: {}",
                SET_WEIGHTS_METHOD, result
            ))),
        }
    }
}

/// Block numbers arrive as JSON numbers or `0x`-prefixed hex strings
fn parse_block_number(value: &Value) -> Result<u64, ChainError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let raw = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("block number missing: {}", value)))?;
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| ChainError::InvalidResponse(format!("bad block number {}: {}", raw, e)))
}

/// A weight vector accepted by `DryRunChain`
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSubmission {
    pub validator_id: String,
    pub block: u64,
    pub weights: Vec<(MinerAddress, u16)>,
}

/// In-memory chain used when no endpoint is configured.
///
/// Only the latest submission is retained.
#[derive(Debug, Default)]
pub struct DryRunChain {
    block: AtomicU64,
    submitted: AtomicU64,
    last: Mutex<Option<RecordedSubmission>>,
}

impl DryRunChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(block: u64) -> Self {
        Self {
            block: AtomicU64::new(block),
            ..Self::default()
        }
    }

    pub fn last_submission(&self) -> Option<RecordedSubmission> {
        self.last.lock().clone()
    }

    /// Number of submissions accepted so far
    pub fn submission_count(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for DryRunChain {
    async fn current_block(&self) -> Result<u64, ChainError> {
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn submit_weights(
        &self,
        validator_id: &str,
        weights: &WeightVector,
    ) -> Result<(), ChainError> {
        let block = self.block.fetch_add(1, Ordering::SeqCst);
        let chain_weights = weights.to_chain_weights();
        for (address, weight) in &chain_weights {
            debug!(miner = %address, weight, "Dry-run weight");
        }
        info!(
            validator = validator_id,
            block,
            miners = chain_weights.len(),
            "Dry run: weights not submitted on-chain"
        );
        *self.last.lock() = Some(RecordedSubmission {
            validator_id: validator_id.to_string(),
            block,
            weights: chain_weights,
        });
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreMap;
    use crate::weights::normalize;
    use httpmock::prelude::*;

    fn sample_weights() -> WeightVector {
        normalize(&ScoreMap::from_scores(vec![
            (MinerAddress::parse("a:1").unwrap(), 1.0),
            (MinerAddress::parse("b:1").unwrap(), 3.0),
        ]))
    }

    fn client_for(server: &MockServer) -> RpcChainClient {
        RpcChainClient::new(server.url("/"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_block_number_formats() {
        assert_eq!(parse_block_number(&json!(42)).unwrap(), 42);
        assert_eq!(parse_block_number(&json!("0x1a")).unwrap(), 26);
        assert_eq!(parse_block_number(&json!("100")).unwrap(), 100);
        assert!(parse_block_number(&json!("0xzz")).is_err());
        assert!(parse_block_number(&Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_current_block_from_hex_header() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body_partial(r#"{"jsonrpc": "2.0", "method": "chain_getHeader"}"#);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "result": {"number": "0x2a", "parentHash": "0x00"},
                    "id": 1
                }));
            })
            .await;

        let block = client_for(&server).current_block().await.unwrap();
        assert_eq!(block, 42);
    }

    #[tokio::test]
    async fn test_submit_weights_sends_u16_vector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/").json_body_partial(
                    r#"{"method": "neuromesh_setWeights", "params": ["validator-1", [["a:1", 21845], ["b:1", 65535]]]}"#,
                );
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "result": true, "id": 1}));
            })
            .await;

        client_for(&server)
            .submit_weights("validator-1", &sample_weights())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_weights_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200)
                    .json_body(json!({"jsonrpc": "2.0", "result": false, "id": 1}));
            })
            .await;

        let err = client_for(&server)
            .submit_weights("v", &sample_weights())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rejected));
    }

    #[tokio::test]
    async fn test_rpc_error_object_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "error": {"code": -32602, "message": "Validator not registered"},
                    "id": 1
                }));
            })
            .await;

        let err = client_for(&server)
            .submit_weights("v", &sample_weights())
            .await
            .unwrap_err();
        match err {
            ChainError::Rpc { code, message } => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Validator not registered");
            }
            other => panic!("Expected Rpc variant, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(502);
            })
            .await;

        let err = client_for(&server).current_block().await.unwrap_err();
        assert!(matches!(err, ChainError::Status(502)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let client = RpcChainClient::new("http://127.0.0.1:65534", Duration::from_secs(2)).unwrap();
        let err = client.current_block().await.unwrap_err();
        assert!(matches!(err, ChainError::Transport(_)));
    }

    #[test]
    fn test_dry_run_records_latest_submission() {
        let chain = DryRunChain::starting_at(100);
        let weights = sample_weights();
        assert!(chain.last_submission().is_none());

        tokio_test::block_on(async {
            assert_eq!(chain.current_block().await.unwrap(), 100);
            chain.submit_weights("validator-1", &weights).await.unwrap();
            chain.submit_weights("validator-2", &weights).await.unwrap();
            assert_eq!(chain.current_block().await.unwrap(), 102);
        });

        assert_eq!(chain.submission_count(), 2);
        let last = chain.last_submission().unwrap();
        assert_eq!(last.block, 101);
        assert_eq!(last.validator_id, "validator-2");
        assert_eq!(last.weights, weights.to_chain_weights());
    }

    #[test]
    fn test_dry_run_retains_one_submission_over_many_rounds() {
        let chain = DryRunChain::new();

        tokio_test::block_on(async {
            for i in 0..10_000u32 {
                let weights = normalize(&ScoreMap::from_scores(vec![(
                    MinerAddress::parse(&format!("m{}:1", i % 7)).unwrap(),
                    1.0,
                )]));
                chain.submit_weights("validator-1", &weights).await.unwrap();
            }
        });

        assert_eq!(chain.submission_count(), 10_000);
        let last = chain.last_submission().unwrap();
        assert_eq!(last.block, 9_999);
        assert_eq!(last.weights.len(), 1);
        assert!(chain.is_dry_run());
    }

    #[test]
    fn test_rpc_client_is_not_dry_run() {
        let client = RpcChainClient::new("http://127.0.0.1:9933", Duration::from_secs(1)).unwrap();
        assert!(!client.is_dry_run());
    }
}
