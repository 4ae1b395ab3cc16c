//! NeuroMesh Validator
//!
//! Samples every miner with the same query, scores the replies and submits
//! the normalized weight vector each round.

use anyhow::{Context, Result};
use clap::Parser;
use neuromesh::{RoundReport, ScoringStrategyKind, SubmissionStatus, Validator, ValidatorConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "neuromesh-validator")]
#[command(about = "NeuroMesh validator - samples miners and computes weight vectors")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "NEUROMESH_CONFIG")]
    config: Option<PathBuf>,

    /// Miner addresses (host:port or http(s) URI), replaces the configured list
    #[arg(short, long, value_delimiter = ',', env = "NEUROMESH_MINERS")]
    miners: Vec<String>,

    /// Query sent to every miner
    #[arg(short, long)]
    query: Option<String>,

    /// Per-miner timeout in milliseconds
    #[arg(long)]
    per_miner_timeout_ms: Option<u64>,

    /// Round deadline in milliseconds
    #[arg(long)]
    round_deadline_ms: Option<u64>,

    /// Seconds between rounds
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Scoring strategy
    #[arg(long, value_enum)]
    scoring: Option<ScoringStrategyKind>,

    /// Miner registry URL
    #[arg(long, env = "NEUROMESH_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Chain JSON-RPC endpoint
    #[arg(long, env = "NEUROMESH_CHAIN_ENDPOINT")]
    chain_endpoint: Option<String>,

    /// Identity weights are submitted under
    #[arg(long, env = "NEUROMESH_VALIDATOR_ID")]
    validator_id: Option<String>,

    /// Compute weights but never submit them on-chain
    #[arg(long)]
    dry_run: bool,

    /// Run a single round and exit
    #[arg(long)]
    once: bool,

    /// With --once, print the round report as JSON
    #[arg(long, requires = "once")]
    json: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut ValidatorConfig) {
        if !self.miners.is_empty() {
            config.miners = self.miners.clone();
        }
        if let Some(query) = &self.query {
            config.query = query.clone();
        }
        if let Some(ms) = self.per_miner_timeout_ms {
            config.per_miner_timeout_ms = ms;
        }
        if let Some(ms) = self.round_deadline_ms {
            config.round_deadline_ms = ms;
        }
        if let Some(secs) = self.interval_secs {
            config.round_interval_secs = secs;
        }
        if let Some(scoring) = self.scoring {
            config.scoring = scoring;
        }
        if let Some(url) = &self.registry_url {
            config.registry_url = Some(url.clone());
        }
        if let Some(endpoint) = &self.chain_endpoint {
            config.chain.endpoint = Some(endpoint.clone());
        }
        if let Some(id) = &self.validator_id {
            config.chain.validator_id = id.clone();
        }
    }
}

fn print_weights(report: &RoundReport) {
    println!("Round {}", report.round_id);
    for (address, weight) in report.weights.iter() {
        println!("  {}: {:.3}", address, weight);
    }
    match &report.submission {
        SubmissionStatus::Submitted => println!("Weights submitted"),
        SubmissionStatus::Failed { reason } => println!("Submission failed: {}", reason),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = ValidatorConfig::load(args.config.as_deref())
        .context("Failed to load validator config")?;
    args.apply(&mut config);

    let validator =
        Validator::from_config(&config, args.dry_run).context("Invalid validator config")?;

    info!("Starting NeuroMesh validator v{}", neuromesh::VERSION);
    info!("  Validator ID: {}", config.chain.validator_id);
    info!("  Scoring: {}", config.scoring);
    match &config.registry_url {
        Some(url) => info!("  Miner registry: {}", url),
        None => info!("  Miners: {}", config.miners.join(", ")),
    }
    if validator.is_dry_run() {
        info!("  Chain: dry run");
    }

    if args.once {
        let report = validator.run_once().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_weights(&report);
        }
        return Ok(());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };
    let rounds = validator.run(config.round_interval(), shutdown).await?;
    info!("Validator stopped after {} rounds", rounds);

    Ok(())
}
