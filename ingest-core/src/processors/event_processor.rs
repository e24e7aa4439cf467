//! EventProcessor processor.
//!
//! Applies pending ledger rows to domain state in `(block_number,
//! log_index)` order. Rows are claimed before dispatch so a concurrent
//! processor cannot pick them up, then updated one by one:
//!
//! - handler ok: `processed`
//! - handler error, retries left: stays `pending` with exponential backoff
//! - handler error, retries exhausted: `failed` (terminal)
//!
//! A row that goes into backoff ends the batch: the rows claimed after it
//! are released and stay behind it until it is applied or fails for good.
//! Rows without a registered handler are marked processed with a warning.

use crate::config::ProcessorConfig;
use crate::entities::EventStatus;
use crate::entities::blockchain_event::{BlockchainEvent, FailureUpdate};
use crate::handlers::{DomainError, HandlerInput, HandlerRegistry};
use crate::store::{LedgerStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger store did not answer within {0:?}")]
    StoreTimeout(Duration),
}

/// Per-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub processed: usize,
    /// Includes unhandled rows, which are also counted in `processed`.
    pub unhandled: usize,
    pub retried: usize,
    pub failed: usize,
    /// Rows whose status update found them no longer pending.
    pub lost: usize,
    /// Claimed rows released unapplied because an earlier row backed off.
    pub deferred: usize,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }
}

pub struct EventProcessor {
    store: Arc<dyn LedgerStore>,
    handlers: HandlerRegistry,
    config: ProcessorConfig,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn LedgerStore>, handlers: HandlerRegistry, config: ProcessorConfig) -> Self {
        Self {
            store,
            handlers,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Claim and apply one batch of due rows.
    pub async fn process_batch(&self) -> Result<BatchReport, ProcessError> {
        self.process_batch_at(OffsetDateTime::now_utc()).await
    }

    /// [`process_batch`](Self::process_batch) with an explicit clock.
    ///
    /// A store error aborts the rest of the batch. Unfinished rows keep
    /// their claim and become due again when it lapses.
    pub async fn process_batch_at(&self, now: OffsetDateTime) -> Result<BatchReport, ProcessError> {
        let lease_until = now + self.config.claim_lease;
        let rows = self
            .with_store_timeout(self.store.claim_due(self.config.batch_size, now, lease_until))
            .await?;

        let mut report = BatchReport {
            claimed: rows.len(),
            ..BatchReport::default()
        };
        if rows.is_empty() {
            return Ok(report);
        }
        debug!(claimed = rows.len(), "Claimed ledger rows");

        let mut rows = rows.into_iter();
        while let Some(row) = rows.next() {
            match self.apply(&row).await {
                Ok(handled) => {
                    if self.with_store_timeout(self.store.mark_processed(row.id, now)).await? {
                        report.processed += 1;
                        if !handled {
                            report.unhandled += 1;
                        }
                    } else {
                        report.lost += 1;
                    }
                }
                Err(e) => {
                    let update = self.failure_update(&row, &e, now);
                    let terminal = update.status == EventStatus::Failed;
                    let retry_count = update.retry_count;
                    if terminal {
                        error!(
                            id = %row.id,
                            position = %row.position(),
                            event_type = %row.event_type,
                            retry_count,
                            error = %e,
                            "Event handler retries exhausted, marking failed"
                        );
                    } else {
                        warn!(
                            id = %row.id,
                            position = %row.position(),
                            event_type = %row.event_type,
                            retry_count,
                            next_retry_at = ?update.next_retry_at,
                            error = %e,
                            "Event handler failed, scheduling retry"
                        );
                    }

                    if self.with_store_timeout(self.store.record_failure(row.id, update)).await? {
                        if terminal {
                            report.failed += 1;
                        } else {
                            report.retried += 1;
                        }
                    } else {
                        report.lost += 1;
                    }

                    if !terminal {
                        let rest: Vec<_> = rows.by_ref().map(|row| row.id).collect();
                        if !rest.is_empty() {
                            report.deferred = rest.len();
                            self.with_store_timeout(self.store.release_claims(rest, now)).await?;
                            debug!(
                                blocked_by = %row.position(),
                                deferred = report.deferred,
                                "Released rows behind a backed-off event"
                            );
                        }
                        break;
                    }
                }
            }
        }

        info!(
            claimed = report.claimed,
            processed = report.processed,
            retried = report.retried,
            failed = report.failed,
            deferred = report.deferred,
            "Processed ledger batch"
        );
        Ok(report)
    }

    /// Returns `Ok(false)` when no handler is registered.
    async fn apply(&self, row: &BlockchainEvent) -> Result<bool, DomainError> {
        let Some(handler) = self.handlers.get(&row.event_type) else {
            warn!(
                id = %row.id,
                event_type = %row.event_type,
                "No handler registered for event type, marking processed"
            );
            return Ok(false);
        };

        let input = HandlerInput {
            tx_hash: &row.tx_hash,
            log_index: row.log_index,
            block_number: row.block_number,
            event_type: &row.event_type,
            payload: &row.payload,
        };
        tokio::time::timeout(self.config.handler_timeout, handler.handle(input))
            .await
            .map_err(|_| DomainError::Timeout)??;
        Ok(true)
    }

    fn failure_update(&self, row: &BlockchainEvent, error: &DomainError, now: OffsetDateTime) -> FailureUpdate {
        let policy = &self.config.retry;
        let retry_count = u32::try_from(row.retry_count).unwrap_or(0).saturating_add(1);
        let (status, next_retry_at) = if policy.is_exhausted(retry_count) {
            (EventStatus::Failed, None)
        } else {
            (EventStatus::Pending, Some(now + policy.delay(retry_count)))
        };
        FailureUpdate {
            retry_count: i32::try_from(retry_count).unwrap_or(i32::MAX),
            status,
            next_retry_at,
            last_error: error.to_string(),
            updated_at: now,
        }
    }

    async fn with_store_timeout<T>(
        &self,
        future: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ProcessError> {
        tokio::time::timeout(self.config.store_timeout, future)
            .await
            .map_err(|_| ProcessError::StoreTimeout(self.config.store_timeout))?
            .map_err(ProcessError::from)
    }
}
