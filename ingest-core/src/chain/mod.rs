//! Access to the external chain.
//!
//! Callers only see the [`ChainClient`] capability. The concrete backend is
//! picked once at startup as a [`ChainBackend`] variant: a JSON-RPC client
//! when an endpoint is configured, an unconfigured stub otherwise.

mod decode;
mod rpc;

pub use decode::{LogDecoder, RpcLog, parse_quantity};
pub use rpc::JsonRpcChainClient;

use crate::config::ChainConfig;
use crate::entities::blockchain_event::BlockchainEventInsert;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by chain calls.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Connection, TLS or HTTP level failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The call did not return within the caller's timeout
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The endpoint answered with something we cannot interpret
    #[error("malformed rpc response: {0}")]
    Malformed(String),

    /// No endpoint is configured
    #[error("chain client not configured: {0}")]
    Unconfigured(String),
}

impl ChainError {
    /// Whether retrying on the next poll cycle can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChainError::Unconfigured(_))
    }
}

/// A chain log normalized for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl From<RawEvent> for BlockchainEventInsert {
    fn from(event: RawEvent) -> Self {
        Self {
            tx_hash: event.tx_hash,
            log_index: event.log_index,
            block_number: event.block_number,
            event_type: event.event_type,
            payload: event.payload,
        }
    }
}

/// Read access to the chain.
///
/// Every call takes the caller's timeout and returns
/// [`ChainError::Timeout`] once it elapses.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_block_number(&self, timeout: Duration) -> Result<i64, ChainError>;

    /// All configured logs in `[from_block, to_block]`.
    async fn get_logs(
        &self,
        from_block: i64,
        to_block: i64,
        timeout: Duration,
    ) -> Result<Vec<RawEvent>, ChainError>;

    /// False for a client that can never succeed.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Chain client selected at startup.
pub enum ChainBackend {
    Rpc(JsonRpcChainClient),
    Unconfigured { reason: String },
}

impl ChainBackend {
    /// Pick the backend for `config`.
    pub fn from_config(config: &ChainConfig) -> Self {
        match &config.rpc_url {
            Some(url) => match JsonRpcChainClient::new(url.clone(), config) {
                Ok(client) => ChainBackend::Rpc(client),
                Err(e) => ChainBackend::Unconfigured {
                    reason: format!("failed to build rpc client: {e}"),
                },
            },
            None => ChainBackend::Unconfigured {
                reason: "no rpc url configured".to_string(),
            },
        }
    }
}

#[async_trait]
impl ChainClient for ChainBackend {
    async fn current_block_number(&self, timeout: Duration) -> Result<i64, ChainError> {
        match self {
            ChainBackend::Rpc(client) => client.current_block_number(timeout).await,
            ChainBackend::Unconfigured { reason } => Err(ChainError::Unconfigured(reason.clone())),
        }
    }

    async fn get_logs(
        &self,
        from_block: i64,
        to_block: i64,
        timeout: Duration,
    ) -> Result<Vec<RawEvent>, ChainError> {
        match self {
            ChainBackend::Rpc(client) => client.get_logs(from_block, to_block, timeout).await,
            ChainBackend::Unconfigured { reason } => Err(ChainError::Unconfigured(reason.clone())),
        }
    }

    fn is_configured(&self) -> bool {
        matches!(self, ChainBackend::Rpc(_))
    }
}
