//! Chain endpoint configuration.

use super::ConfigError;
use std::time::Duration;
use url::Url;

/// A contract event the poller should ingest.
///
/// `params` names the event arguments in order: indexed arguments first
/// (taken from `topics[1..]`), then the non-indexed ones (32-byte words of
/// `data`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    /// Event type tag stored on the ledger row (e.g. `BatchMinted`).
    pub name: String,
    /// Keccak hash of the event signature, `0x`-prefixed.
    pub topic0: String,
    pub params: Vec<String>,
}

/// Where and what to read from the chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// JSON-RPC endpoint. `None` selects the unconfigured client.
    pub rpc_url: Option<Url>,
    /// Only logs emitted by this address are requested, when set.
    pub contract_address: Option<String>,
    pub events: Vec<EventSpec>,
    /// Timeout applied to every RPC call.
    pub request_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            events: Vec::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ChainConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "chain request_timeout must be non-zero".to_string(),
            ));
        }
        if let Some(url) = &self.rpc_url {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Validation(format!(
                    "unsupported rpc url scheme: {}",
                    url.scheme()
                )));
            }
        }
        if let Some(address) = &self.contract_address {
            if !is_hex_of_len(address, 40) {
                return Err(ConfigError::Validation(format!(
                    "contract address is not a 20-byte hex string: {address}"
                )));
            }
        }
        for event in &self.events {
            if event.name.is_empty() {
                return Err(ConfigError::Validation("event name must not be empty".to_string()));
            }
            if !is_hex_of_len(&event.topic0, 64) {
                return Err(ConfigError::Validation(format!(
                    "topic0 of {} is not a 32-byte hex string",
                    event.name
                )));
            }
        }
        Ok(())
    }
}

fn is_hex_of_len(value: &str, digits: usize) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == digits && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
