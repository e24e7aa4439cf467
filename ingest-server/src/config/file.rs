//! TOML file configuration structures.
//!
//! These structs directly map to the `ingest-server.toml` file format. Every
//! section and key is optional; missing values take the defaults below.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub chain: ChainConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    pub listen: SocketAddr,
    pub database_max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_max_connections: 10,
        }
    }
}

/// Pipeline cadence, retry and breaker knobs. Durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub process_interval_secs: u64,
    pub heartbeat_secs: u64,
    pub max_block_span: u64,
    pub confirmations: u64,
    pub start_block: i64,
    pub store_timeout_secs: u64,
    pub batch_size: u32,
    pub claim_lease_secs: u64,
    pub handler_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub failure_threshold: u32,
    pub cooldown_seconds: u64,
    pub max_cooldown_seconds: u64,
    pub health_cache_ttl_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 3,
            process_interval_secs: 2,
            heartbeat_secs: 60,
            max_block_span: 500,
            confirmations: 0,
            start_block: 0,
            store_timeout_secs: 10,
            batch_size: 100,
            claim_lease_secs: 300,
            handler_timeout_secs: 30,
            max_retries: 5,
            backoff_base_secs: 2,
            backoff_cap_secs: 300,
            failure_threshold: 3,
            cooldown_seconds: 30,
            max_cooldown_seconds: 300,
            health_cache_ttl_seconds: 5,
        }
    }
}

/// Chain endpoint and the contract events to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub request_timeout_seconds: u64,
    pub events: Vec<EventConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            request_timeout_seconds: 10,
            events: Vec::new(),
        }
    }
}

/// One `[[chain.events]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub name: String,
    pub topic0: String,
    #[serde(default)]
    pub params: Vec<String>,
}
