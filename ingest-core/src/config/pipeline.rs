//! Knobs for the poller, the processor and the circuit breaker.

use super::ConfigError;
use crate::utils::backoff::exponential_delay;
use std::time::Duration;

/// Chain poller settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Upper bound on blocks requested by a single `getLogs` call.
    pub max_block_span: u64,
    /// Blocks behind the head that are not ingested yet.
    pub confirmations: u64,
    /// First block to ingest when no checkpoint exists.
    pub start_block: i64,
    /// Timeout applied to every ledger store call.
    pub store_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_block_span: 500,
            confirmations: 0,
            start_block: 0,
            store_timeout: Duration::from_secs(10),
        }
    }
}

impl PollerConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_span == 0 {
            return Err(ConfigError::Validation("max_block_span must be at least 1".to_string()));
        }
        if self.start_block < 0 {
            return Err(ConfigError::Validation("start_block must not be negative".to_string()));
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::Validation("store_timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Handler retry policy.
///
/// The n-th consecutive failure (n starting at 1) schedules the next
/// attempt `base * 2^(n-1)` later, capped at `cap`. Once `max_retries`
/// failures have been recorded the row is terminal.
///
/// `max_retries` bounds the total number of failed attempts: a row is
/// invoked at most `max_retries` times and gets no extra attempt after
/// the `max_retries`-th failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `retry_count` failures.
    pub fn delay(&self, retry_count: u32) -> Duration {
        exponential_delay(self.base, self.cap, retry_count.saturating_sub(1))
    }

    /// True once `retry_count` (failures recorded so far, including the one
    /// just observed) reaches `max_retries`.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

/// Event processor settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Rows claimed per batch.
    pub batch_size: u32,
    /// How long a claimed row stays invisible to other claims. A crash
    /// mid-batch makes the row eligible again once this elapses.
    pub claim_lease: Duration,
    pub retry: RetryPolicy,
    pub store_timeout: Duration,
    /// Upper bound on a single domain handler invocation.
    pub handler_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            claim_lease: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(10),
            handler_timeout: Duration::from_secs(30),
        }
    }
}

impl ProcessorConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be at least 1".to_string()));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Validation("max_retries must be at least 1".to_string()));
        }
        if self.retry.cap < self.retry.base {
            return Err(ConfigError::Validation(
                "backoff cap must not be smaller than backoff base".to_string(),
            ));
        }
        if self.claim_lease.is_zero() || self.store_timeout.is_zero() || self.handler_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "claim_lease, store_timeout and handler_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker settings.
///
/// The first opening uses `cooldown`. Each failed half-open probe doubles
/// it, up to `max_cooldown`. A successful probe resets it.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub max_cooldown: Duration,
    pub health_cache_ttl: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
            health_cache_ttl: Duration::from_secs(5),
        }
    }
}

impl BreakerConfig {
    /// Cooldown after `reopen_count` consecutive failed probes.
    pub fn cooldown_for(&self, reopen_count: u32) -> Duration {
        exponential_delay(self.cooldown, self.max_cooldown, reopen_count)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Validation("failure_threshold must be at least 1".to_string()));
        }
        if self.max_cooldown < self.cooldown {
            return Err(ConfigError::Validation(
                "max_cooldown must not be smaller than cooldown".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_then_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(8),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(8));
        assert!(!policy.is_exhausted(9));
        assert!(policy.is_exhausted(10));
    }

    #[test]
    fn test_breaker_cooldown_doubles_until_max() {
        let config = BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(10),
            max_cooldown: Duration::from_secs(35),
            health_cache_ttl: Duration::from_secs(1),
        };
        assert_eq!(config.cooldown_for(0), Duration::from_secs(10));
        assert_eq!(config.cooldown_for(1), Duration::from_secs(20));
        assert_eq!(config.cooldown_for(2), Duration::from_secs(35));
        assert_eq!(config.cooldown_for(7), Duration::from_secs(35));
    }
}
