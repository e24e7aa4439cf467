//! Environment / CLI overrides for the file configuration.
//!
//! Every flag is optional. When set (on the command line or through its
//! environment variable) it replaces the value read from the TOML file.

use super::file::FileConfig;
use clap::Args;

#[derive(Args, Debug, Clone, Default)]
pub struct IngestOverrides {
    /// Enable or disable the blockchain listener
    #[arg(long, env = "ENABLE_BLOCKCHAIN_LISTENER")]
    pub enable_blockchain_listener: Option<bool>,

    /// JSON-RPC endpoint of the chain node
    #[arg(long, env = "WEB3_RPC_URL")]
    pub web3_rpc_url: Option<String>,

    /// Only ingest logs emitted by this contract
    #[arg(long, env = "BATCH_CONTRACT_ADDRESS")]
    pub batch_contract_address: Option<String>,

    #[arg(long, env = "INGEST_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,

    #[arg(long, env = "INGEST_PROCESS_INTERVAL_SECS")]
    pub process_interval_secs: Option<u64>,

    #[arg(long, env = "INGEST_MAX_BLOCK_SPAN")]
    pub max_block_span: Option<u64>,

    #[arg(long, env = "INGEST_CONFIRMATIONS")]
    pub confirmations: Option<u64>,

    #[arg(long, env = "INGEST_START_BLOCK")]
    pub start_block: Option<i64>,

    #[arg(long, env = "BLOCKCHAIN_FAILURE_THRESHOLD")]
    pub failure_threshold: Option<u32>,

    #[arg(long, env = "BLOCKCHAIN_COOLDOWN_SECONDS")]
    pub cooldown_seconds: Option<u64>,

    #[arg(long, env = "BLOCKCHAIN_MAX_COOLDOWN_SECONDS")]
    pub max_cooldown_seconds: Option<u64>,

    #[arg(long, env = "BLOCKCHAIN_HEALTH_CACHE_TTL_SECONDS")]
    pub health_cache_ttl_seconds: Option<u64>,

    #[arg(long, env = "BLOCKCHAIN_REQUEST_TIMEOUT_SECONDS")]
    pub request_timeout_seconds: Option<u64>,

    #[arg(long, env = "INGEST_STORE_TIMEOUT_SECS")]
    pub store_timeout_secs: Option<u64>,

    #[arg(long, env = "INGEST_HEARTBEAT_SECS")]
    pub heartbeat_secs: Option<u64>,

    #[arg(long, env = "INGEST_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "INGEST_BACKOFF_BASE_SECS")]
    pub backoff_base_secs: Option<u64>,

    #[arg(long, env = "INGEST_BACKOFF_CAP_SECS")]
    pub backoff_cap_secs: Option<u64>,

    #[arg(long, env = "INGEST_BATCH_SIZE")]
    pub batch_size: Option<u32>,

    #[arg(long, env = "INGEST_CLAIM_LEASE_SECS")]
    pub claim_lease_secs: Option<u64>,

    #[arg(long, env = "INGEST_HANDLER_TIMEOUT_SECS")]
    pub handler_timeout_secs: Option<u64>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl IngestOverrides {
    pub fn apply(self, config: &mut FileConfig) {
        let ingest = &mut config.ingest;
        let chain = &mut config.chain;

        set(&mut ingest.enabled, self.enable_blockchain_listener);
        if self.web3_rpc_url.is_some() {
            chain.rpc_url = self.web3_rpc_url;
        }
        if self.batch_contract_address.is_some() {
            chain.contract_address = self.batch_contract_address;
        }
        set(&mut ingest.poll_interval_secs, self.poll_interval_secs);
        set(&mut ingest.process_interval_secs, self.process_interval_secs);
        set(&mut ingest.max_block_span, self.max_block_span);
        set(&mut ingest.confirmations, self.confirmations);
        set(&mut ingest.start_block, self.start_block);
        set(&mut ingest.failure_threshold, self.failure_threshold);
        set(&mut ingest.cooldown_seconds, self.cooldown_seconds);
        set(&mut ingest.max_cooldown_seconds, self.max_cooldown_seconds);
        set(&mut ingest.health_cache_ttl_seconds, self.health_cache_ttl_seconds);
        set(&mut chain.request_timeout_seconds, self.request_timeout_seconds);
        set(&mut ingest.store_timeout_secs, self.store_timeout_secs);
        set(&mut ingest.heartbeat_secs, self.heartbeat_secs);
        set(&mut ingest.max_retries, self.max_retries);
        set(&mut ingest.backoff_base_secs, self.backoff_base_secs);
        set(&mut ingest.backoff_cap_secs, self.backoff_cap_secs);
        set(&mut ingest.batch_size, self.batch_size);
        set(&mut ingest.claim_lease_secs, self.claim_lease_secs);
        set(&mut ingest.handler_timeout_secs, self.handler_timeout_secs);
    }
}
