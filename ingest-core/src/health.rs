//! Health Reporter: read model over the ledger store and the breaker.

use crate::breaker::CircuitBreaker;
use crate::store::{LedgerStore, StoreError};
use ledger_ingest_sdk::objects::HealthSnapshot;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Computes [`HealthSnapshot`]s on demand.
///
/// Only reads: two store queries and the breaker's in-memory state. It never
/// writes and never calls the chain. Each store query is bounded by
/// `store_timeout`.
#[derive(Clone)]
pub struct HealthReporter {
    store: Arc<dyn LedgerStore>,
    breaker: Arc<CircuitBreaker>,
    started_at: Instant,
    store_timeout: Duration,
}

impl HealthReporter {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        breaker: Arc<CircuitBreaker>,
        started_at: Instant,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            breaker,
            started_at,
            store_timeout,
        }
    }

    pub async fn snapshot(&self, running: bool) -> Result<HealthSnapshot, StoreError> {
        let counts = self.read(self.store.status_counts()).await?;
        let last_block = self.read(self.store.checkpoint()).await?;
        let breaker = self.breaker.snapshot();

        Ok(HealthSnapshot {
            running,
            backlog_size: counts.pending,
            failed_count: counts.failed,
            last_block,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            breaker_state: breaker.state,
            consecutive_failures: breaker.consecutive_failures,
        })
    }

    async fn read<T>(&self, future: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, future)
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))?
    }
}
