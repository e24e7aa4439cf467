use serde::{Deserialize, Serialize};

/// State of the chain endpoint circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => f.write_str("Closed"),
            BreakerState::Open => f.write_str("Open"),
            BreakerState::HalfOpen => f.write_str("HalfOpen"),
        }
    }
}

/// Point-in-time view of the ingestion pipeline.
///
/// Computed on demand from the ledger store, the poller checkpoint and the
/// breaker. Producing it never writes anything and never calls the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub running: bool,
    pub backlog_size: u64,
    pub failed_count: u64,
    /// Last fully ingested block, `None` before the first successful poll.
    pub last_block: Option<i64>,
    pub uptime_seconds: u64,
    pub breaker_state: BreakerState,
    pub consecutive_failures: u32,
}

/// Health of a single dependency in the deep health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
}

/// Body of `GET /system/health/deep`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepHealthResponse {
    pub healthy: bool,
    pub database: ComponentHealth,
    pub blockchain: ComponentHealth,
    /// `None` when the ledger could not be read.
    pub listener: Option<HealthSnapshot>,
}
