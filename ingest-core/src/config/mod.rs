//! Runtime configuration for the ingestion subsystem.
//!
//! These types hold validated values. Reading them from files and the
//! environment is the server crate's job.

mod chain;
mod pipeline;

pub use chain::{ChainConfig, EventSpec};
pub use pipeline::{BreakerConfig, PollerConfig, ProcessorConfig, RetryPolicy};

use std::time::Duration;
use thiserror::Error;

/// Errors produced while validating the ingestion configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid ingest configuration: {0}")]
    Validation(String),
}

/// Complete configuration of the ingestion subsystem.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Master switch. When false the supervisor is never started.
    pub enabled: bool,
    pub chain: ChainConfig,
    pub poller: PollerConfig,
    pub processor: ProcessorConfig,
    pub breaker: BreakerConfig,
    /// Cadence of the chain poller loop.
    pub poll_interval: Duration,
    /// Cadence of the retry scheduler loop.
    pub process_interval: Duration,
    /// Cadence of the heartbeat log line.
    pub heartbeat_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: ChainConfig::default(),
            poller: PollerConfig::default(),
            processor: ProcessorConfig::default(),
            breaker: BreakerConfig::default(),
            poll_interval: Duration::from_secs(3),
            process_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

impl IngestConfig {
    /// Check every section, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("poll_interval", self.poll_interval),
            ("process_interval", self.process_interval),
            ("heartbeat_interval", self.heartbeat_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }
        self.chain.validate()?;
        self.poller.validate()?;
        self.processor.validate()?;
        self.breaker.validate()?;
        Ok(())
    }
}
