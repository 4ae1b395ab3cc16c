//! Miner discovery collaborator
//!
//! Supplies the set of miners queried each round, either from a fixed list
//! or from a registry server.

use crate::error::DiscoveryError;
use crate::types::MinerAddress;
use crate::util::sanitize_for_log;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for registry requests
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait MinerDiscovery: Send + Sync {
    async fn miners(&self) -> Result<Vec<MinerAddress>, DiscoveryError>;
}

/// Fixed miner list from configuration
#[derive(Clone, Debug)]
pub struct StaticDiscovery {
    miners: Vec<MinerAddress>,
}

impl StaticDiscovery {
    pub fn new(mut miners: Vec<MinerAddress>) -> Self {
        miners.sort();
        miners.dedup();
        Self { miners }
    }
}

#[async_trait]
impl MinerDiscovery for StaticDiscovery {
    async fn miners(&self) -> Result<Vec<MinerAddress>, DiscoveryError> {
        Ok(self.miners.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MinerEntry {
    address: String,
}

/// Fetches the miner list from `{registry_url}/api/v1/miners`
pub struct RegistryDiscovery {
    registry_url: String,
    client: Client,
}

impl RegistryDiscovery {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl MinerDiscovery for RegistryDiscovery {
    async fn miners(&self) -> Result<Vec<MinerAddress>, DiscoveryError> {
        let url = format!("{}/api/v1/miners", self.registry_url);
        debug!("Fetching miner list from {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(REGISTRY_TIMEOUT)
            .send()
            .await
            .map_err(|e| DiscoveryError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        let entries: Vec<MinerEntry> = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;

        let mut miners: Vec<MinerAddress> = entries
            .into_iter()
            .filter_map(|entry| match MinerAddress::parse(&entry.address) {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!(
                        address = %sanitize_for_log(&entry.address),
                        "Skipping registry entry: {}", e
                    );
                    None
                }
            })
            .collect();
        miners.sort();
        miners.dedup();

        info!("Miner registry returned {} miners", miners.len());
        Ok(miners)
    }
}
