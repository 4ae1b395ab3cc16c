//! NeuroMesh Reference Miner
//!
//! Echo inference server used for local networks and testing.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "neuromesh-miner")]
#[command(about = "NeuroMesh reference miner")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "MINER_HOST")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "5000", env = "MINER_PORT")]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;

    info!("Starting NeuroMesh miner v{}", neuromesh::VERSION);

    neuromesh::miner::serve_with_shutdown(addr, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await
    .context("Miner server failed")?;

    Ok(())
}
