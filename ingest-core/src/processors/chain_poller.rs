//! ChainPoller processor.
//!
//! The ChainPoller is responsible for:
//! - Reading the ingestion checkpoint from the ledger store
//! - Fetching the next block range of logs through the circuit breaker
//! - Ingesting them idempotently, advancing the checkpoint in the same unit
//! - Emitting an `IngestTick` when new rows landed
//!
//! A failed cycle leaves the checkpoint untouched; the next cycle retries
//! the same range.

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::chain::{ChainClient, ChainError};
use crate::config::PollerConfig;
use crate::events::{IngestTick, IngestTickSender};
use crate::store::{LedgerStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger store did not answer within {0:?}")]
    StoreTimeout(Duration),
}

/// Why a poll cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another `poll_once` is still running
    AlreadyRunning,
    BreakerOpen { retry_in: Duration },
    ProbeInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `[from_block, to_block]` was ingested and the checkpoint moved to `to_block`
    Ingested {
        from_block: i64,
        to_block: i64,
        inserted: u64,
    },
    /// Nothing new below the confirmation margin
    UpToDate { head: i64 },
    Skipped(SkipReason),
}

enum Gated<T> {
    Done(T),
    Skipped(SkipReason),
}

pub struct ChainPoller {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    breaker: Arc<CircuitBreaker>,
    config: PollerConfig,
    rpc_timeout: Duration,
    in_flight: Mutex<()>,
}

impl ChainPoller {
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn LedgerStore>,
        breaker: Arc<CircuitBreaker>,
        config: PollerConfig,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            client,
            store,
            breaker,
            config,
            rpc_timeout,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one poll cycle.
    ///
    /// Concurrent invocations do not overlap: the second one returns
    /// [`SkipReason::AlreadyRunning`] immediately.
    pub async fn poll_once(&self) -> Result<PollOutcome, PollError> {
        let Ok(_running) = self.in_flight.try_lock() else {
            return Ok(PollOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        let checkpoint = self.with_store_timeout(self.store.checkpoint()).await?;
        let from_block = checkpoint.map_or(self.config.start_block, |block| block + 1);

        let head = match self
            .gated(|| self.client.current_block_number(self.rpc_timeout))
            .await?
        {
            Gated::Done(head) => head,
            Gated::Skipped(reason) => return Ok(PollOutcome::Skipped(reason)),
        };

        let confirmations = i64::try_from(self.config.confirmations).unwrap_or(i64::MAX);
        let safe_head = head.saturating_sub(confirmations);
        if safe_head < from_block {
            debug!(head, from_block, "Chain poller is up to date");
            return Ok(PollOutcome::UpToDate { head });
        }
        let span = i64::try_from(self.config.max_block_span).unwrap_or(i64::MAX);
        let to_block = safe_head.min(from_block.saturating_add(span - 1));

        let events = match self
            .gated(|| self.client.get_logs(from_block, to_block, self.rpc_timeout))
            .await?
        {
            Gated::Done(events) => events,
            Gated::Skipped(reason) => return Ok(PollOutcome::Skipped(reason)),
        };
        let fetched = events.len();

        let inserted = self
            .with_store_timeout(
                self.store
                    .ingest(events.into_iter().map(Into::into).collect(), to_block),
            )
            .await?;

        info!(from_block, to_block, fetched, inserted, "Ingested block range");
        Ok(PollOutcome::Ingested {
            from_block,
            to_block,
            inserted,
        })
    }

    /// Poll on `interval` until shutdown is signaled.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        tick_tx: Option<IngestTickSender>,
    ) {
        info!(?interval, "ChainPoller started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("ChainPoller received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(PollOutcome::Ingested { from_block, to_block, inserted }) if inserted > 0 => {
                            if let Some(tick_tx) = &tick_tx {
                                // A full buffer already guarantees a wake-up.
                                let _ = tick_tx.try_send(IngestTick { from_block, to_block, inserted });
                            }
                        }
                        Ok(PollOutcome::Skipped(reason)) => {
                            debug!(?reason, "Poll cycle skipped");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Poll cycle failed");
                        }
                    }
                }
            }
        }

        info!("ChainPoller shutdown complete");
    }

    async fn gated<T, F, Fut>(&self, f: F) -> Result<Gated<T>, PollError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        match self.breaker.call(f).await {
            Ok(value) => Ok(Gated::Done(value)),
            Err(BreakerError::Open { retry_in }) => Ok(Gated::Skipped(SkipReason::BreakerOpen { retry_in })),
            Err(BreakerError::ProbeInFlight) => Ok(Gated::Skipped(SkipReason::ProbeInFlight)),
            Err(BreakerError::Inner(e)) => Err(e.into()),
        }
    }

    async fn with_store_timeout<T>(
        &self,
        future: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, PollError> {
        tokio::time::timeout(self.config.store_timeout, future)
            .await
            .map_err(|_| PollError::StoreTimeout(self.config.store_timeout))?
            .map_err(PollError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::processors::testing::{ScriptedChain, raw_event};
    use crate::store::MemoryLedgerStore;

    fn poller(chain: Arc<ScriptedChain>, store: Arc<MemoryLedgerStore>) -> ChainPoller {
        ChainPoller::new(
            chain,
            store,
            Arc::new(CircuitBreaker::new(BreakerConfig::default())),
            PollerConfig {
                max_block_span: 500,
                confirmations: 0,
                start_block: 100,
                store_timeout: Duration::from_secs(5),
            },
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_ingests_range_and_advances_checkpoint() {
        let chain = Arc::new(ScriptedChain::new(105));
        chain.add_logs([raw_event("0xaa", 0, 101), raw_event("0xbb", 1, 104)]);
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = poller(chain.clone(), store.clone());

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Ingested { from_block: 100, to_block: 105, inserted: 2 }
        );
        assert_eq!(store.checkpoint().await.unwrap(), Some(105));
        assert_eq!(chain.log_requests(), vec![(100, 105)]);

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::UpToDate { head: 105 });
    }

    #[tokio::test]
    async fn test_range_is_bounded_by_span_and_confirmations() {
        let chain = Arc::new(ScriptedChain::new(2_000));
        let store = Arc::new(MemoryLedgerStore::new());
        let mut poller = poller(chain.clone(), store.clone());
        poller.config.max_block_span = 10;
        poller.config.confirmations = 1_895;

        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();
        assert_eq!(chain.log_requests(), vec![(100, 105)]);
        assert_eq!(store.checkpoint().await.unwrap(), Some(105));

        poller.config.confirmations = 0;
        poller.poll_once().await.unwrap();
        assert_eq!(chain.log_requests(), vec![(100, 105), (106, 115)]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_checkpoint() {
        let chain = Arc::new(ScriptedChain::new(105));
        chain.add_logs([raw_event("0xaa", 0, 101)]);
        chain.fail_next_log_calls(1);
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = poller(chain.clone(), store.clone());

        assert!(matches!(poller.poll_once().await, Err(PollError::Chain(_))));
        assert_eq!(store.checkpoint().await.unwrap(), None);
        assert!(store.rows().await.is_empty());

        poller.poll_once().await.unwrap();
        assert_eq!(store.checkpoint().await.unwrap(), Some(105));
        assert_eq!(chain.log_requests(), vec![(100, 105), (100, 105)]);
    }

    #[tokio::test]
    async fn test_failed_store_write_keeps_checkpoint() {
        let chain = Arc::new(ScriptedChain::new(105));
        chain.add_logs([raw_event("0xaa", 0, 101)]);
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = poller(chain.clone(), store.clone());

        store.set_unavailable(true).await;
        assert!(matches!(poller.poll_once().await, Err(PollError::Store(_))));
        store.set_unavailable(false).await;
        assert_eq!(store.checkpoint().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overlapping_window_does_not_duplicate() {
        let chain = Arc::new(ScriptedChain::new(105));
        chain.add_logs([raw_event("0xaa", 0, 105)]);
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = poller(chain.clone(), store.clone());
        poller.poll_once().await.unwrap();

        // Simulate a window that re-covers block 105.
        store.ingest(vec![raw_event("0xaa", 0, 105).into()], 105).await.unwrap();
        assert_eq!(store.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_poll_is_skipped() {
        let chain = Arc::new(ScriptedChain::new(105));
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = poller(chain, store);

        let _held = poller.in_flight.try_lock().unwrap();
        assert_eq!(
            poller.poll_once().await.unwrap(),
            PollOutcome::Skipped(SkipReason::AlreadyRunning)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_opens_breaker_then_resumes_from_checkpoint() {
        let chain = Arc::new(ScriptedChain::new(105));
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = poller(chain.clone(), store.clone());
        poller.poll_once().await.unwrap();
        assert_eq!(store.checkpoint().await.unwrap(), Some(105));

        chain.set_head(110);
        chain.add_logs([raw_event("0xcc", 0, 108)]);
        chain.fail_next_head_calls(3);
        for _ in 0..3 {
            assert!(matches!(poller.poll_once().await, Err(PollError::Chain(_))));
        }
        assert_eq!(poller.breaker.state(), crate::breaker::BreakerState::Open);

        let calls_before = chain.head_calls();
        assert!(matches!(
            poller.poll_once().await.unwrap(),
            PollOutcome::Skipped(SkipReason::BreakerOpen { .. })
        ));
        assert_eq!(chain.head_calls(), calls_before);

        tokio::time::advance(BreakerConfig::default().cooldown).await;
        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Ingested { from_block: 106, to_block: 110, inserted: 1 }
        );
        assert_eq!(poller.breaker.state(), crate::breaker::BreakerState::Closed);
        assert_eq!(poller.breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_tick_and_stops_on_shutdown() {
        let chain = Arc::new(ScriptedChain::new(105));
        chain.add_logs([raw_event("0xaa", 0, 101)]);
        let store = Arc::new(MemoryLedgerStore::new());
        let poller = Arc::new(poller(chain, store));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tick_tx, mut tick_rx) = crate::events::ingest_tick_channel();

        let handle = tokio::spawn(poller.run(Duration::from_secs(3), shutdown_rx, Some(tick_tx)));
        let tick = tick_rx.recv().await.unwrap();
        assert_eq!(tick, IngestTick { from_block: 100, to_block: 105, inserted: 1 });

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
