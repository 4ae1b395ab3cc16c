//! Reference miner
//!
//! Minimal inference endpoint that echoes the input back. Used for local
//! networks and as the live counterpart in end-to-end tests.

use crate::util::sanitize_for_log;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Prefix of every reference miner reply
pub const REPLY_PREFIX: &str = "Hello from NeuroMesh miner! You sent: ";

#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub served: u64,
    pub uptime_secs: u64,
}

struct MinerState {
    served: AtomicU64,
    started_at: Instant,
}

/// Reply the reference miner gives to `input`
pub fn reply_for(input: &str) -> String {
    format!("{}{}", REPLY_PREFIX, input)
}

pub fn router() -> Router {
    let state = Arc::new(MinerState {
        served: AtomicU64::new(0),
        started_at: Instant::now(),
    });

    Router::new()
        .route("/", post(inference_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn inference_handler(
    State(state): State<Arc<MinerState>>,
    Json(request): Json<InferenceRequest>,
) -> Json<InferenceResponse> {
    state.served.fetch_add(1, Ordering::Relaxed);
    debug!(input = %sanitize_for_log(&request.input), "Inference request");

    Json(InferenceResponse {
        output: reply_for(&request.input),
    })
}

async fn health_handler(State(state): State<Arc<MinerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        served: state.served.load(Ordering::Relaxed),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// Serve on an already bound listener until the process stops
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Miner listening on {}", addr);
    }
    axum::serve(listener, router()).await
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve_with_shutdown<F>(addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("Miner listening on {}", listener.local_addr()?);
    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await
}
