//! Round-scoped data model
//!
//! Every value here is created fresh for one validation round and dropped
//! once the weight vector has been handed to the chain collaborator:
//! - `MinerAddress`: one miner endpoint, ordered lexicographically
//! - `Query`: the prompt sent to every miner in a round
//! - `Outcome`: the classified result of querying one miner
//! - `RoundOutcomes`: exactly one outcome per queried address

use crate::error::AddressError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Address of one miner endpoint.
///
/// Accepts either `host:port` or an absolute `http(s)://` URI. A plain
/// `http://host:port/` URI is stored in its `host:port` form, with the host
/// lowercased the way URL parsing does, so one miner has one key however it
/// is written. Other URIs are kept as given. Ordering is lexicographic on the
/// stored key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinerAddress(String);

impl MinerAddress {
    /// Parse and validate an address
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        // Validate eagerly so that a bad entry is rejected at configuration time
        let url = Self::resolve(trimmed)?;
        Ok(Self(Self::canonical_key(&url).unwrap_or_else(|| trimmed.to_string())))
    }

    /// `host:port` key for URLs that carry nothing beyond host and port
    fn canonical_key(url: &Url) -> Option<String> {
        let plain = url.scheme() == "http"
            && url.username().is_empty()
            && url.password().is_none()
            && url.path() == "/"
            && url.query().is_none()
            && url.fragment().is_none();
        if !plain {
            return None;
        }
        Some(format!("{}:{}", url.host_str()?, url.port_or_known_default()?))
    }

    /// The address as configured
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// HTTP endpoint the inference request is posted to
    pub fn endpoint(&self) -> Result<Url, AddressError> {
        Self::resolve(&self.0)
    }

    fn resolve(raw: &str) -> Result<Url, AddressError> {
        if raw.contains("://") {
            let url = Url::parse(raw).map_err(|e| AddressError::InvalidUri {
                address: raw.to_string(),
                reason: e.to_string(),
            })?;
            match url.scheme() {
                "http" | "https" => {}
                other => {
                    return Err(AddressError::UnsupportedScheme {
                        address: raw.to_string(),
                        scheme: other.to_string(),
                    })
                }
            }
            if url.host_str().map_or(true, str::is_empty) {
                return Err(AddressError::MissingHost(raw.to_string()));
            }
            return Ok(url);
        }

        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(raw.to_string()))?;
        if host.is_empty() {
            return Err(AddressError::MissingHost(raw.to_string()));
        }
        port.parse::<u16>()
            .map_err(|_| AddressError::InvalidPort {
                address: raw.to_string(),
                port: port.to_string(),
            })?;

        Url::parse(&format!("http://{}/", raw)).map_err(|e| AddressError::InvalidUri {
            address: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for MinerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MinerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MinerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MinerAddress> for String {
    fn from(address: MinerAddress) -> Self {
        address.0
    }
}

/// Inference payload sent to every miner of a round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub input: String,
}

impl Query {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Why a miner produced no usable output
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection could not be established
    Unreachable,
    /// Per-miner timeout or round deadline elapsed first
    Timeout,
    /// Body was not the expected JSON or had no `output` string
    MalformedResponse,
    /// Miner answered with a non-2xx status
    ServerError { status: u16 },
    /// `output` was present but empty
    EmptyOutput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unreachable => write!(f, "unreachable"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::MalformedResponse => write!(f, "malformed response"),
            ErrorKind::ServerError { status } => write!(f, "server error ({})", status),
            ErrorKind::EmptyOutput => write!(f, "empty output"),
        }
    }
}

/// Result of querying one miner with one query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { output: String, latency: Duration },
    Failure { reason: ErrorKind },
}

impl Outcome {
    pub fn success(output: impl Into<String>, latency: Duration) -> Self {
        Outcome::Success {
            output: output.into(),
            latency,
        }
    }

    pub fn failure(reason: ErrorKind) -> Self {
        Outcome::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Failure reason, if any
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { reason } => Some(*reason),
        }
    }
}

/// One outcome per queried address, in address order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcomes {
    entries: Vec<(MinerAddress, Outcome)>,
}

impl RoundOutcomes {
    /// Build from entries already sorted by address with no duplicates
    pub(crate) fn from_sorted(entries: Vec<(MinerAddress, Outcome)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries }
    }

    pub fn get(&self, address: &MinerAddress) -> Option<&Outcome> {
        self.entries
            .binary_search_by(|(a, _)| a.cmp(address))
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MinerAddress, &Outcome)> {
        self.entries.iter().map(|(a, o)| (a, o))
    }

    pub fn addresses(&self) -> impl Iterator<Item = &MinerAddress> {
        self.entries.iter().map(|(a, _)| a)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }
}
