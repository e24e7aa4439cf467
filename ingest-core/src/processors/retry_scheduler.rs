//! RetryScheduler processor.
//!
//! Drives the [`EventProcessor`] on a fixed cadence and whenever the poller
//! reports new rows. It keeps no state of its own: due rows (fresh or
//! backed off) are found by the processor's claim query.

use super::event_processor::{BatchReport, EventProcessor, ProcessError};
use crate::events::IngestTickReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Upper bound on consecutive batches per wake-up, so a large backlog
/// cannot delay a shutdown check indefinitely.
const MAX_BATCHES_PER_DRAIN: usize = 10;

pub struct RetryScheduler {
    processor: Arc<EventProcessor>,
}

impl RetryScheduler {
    pub fn new(processor: Arc<EventProcessor>) -> Self {
        Self { processor }
    }

    /// Process batches until one comes back short.
    pub async fn drain(&self) -> Result<BatchReport, ProcessError> {
        let batch_size = self.processor.config().batch_size as usize;
        let mut total = BatchReport::default();

        for _ in 0..MAX_BATCHES_PER_DRAIN {
            let report = self.processor.process_batch().await?;
            total.claimed += report.claimed;
            total.processed += report.processed;
            total.unhandled += report.unhandled;
            total.retried += report.retried;
            total.failed += report.failed;
            total.lost += report.lost;
            total.deferred += report.deferred;
            if report.claimed < batch_size {
                break;
            }
        }
        Ok(total)
    }

    /// Drain on `interval` and on every ingest tick until shutdown is signaled.
    pub async fn run(
        self,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        mut tick_rx: IngestTickReceiver,
    ) {
        info!(?interval, "RetryScheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("RetryScheduler received shutdown signal");
                        break;
                    }
                }

                Some(tick) = tick_rx.recv() => {
                    debug!(?tick, "Received IngestTick");
                    self.drain_and_log().await;
                }

                _ = ticker.tick() => {
                    self.drain_and_log().await;
                }
            }
        }

        info!("RetryScheduler shutdown complete");
    }

    async fn drain_and_log(&self) {
        match self.drain().await {
            Ok(report) if !report.is_empty() => {
                debug!(?report, "Drained ledger backlog");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to process ledger batch");
            }
        }
    }
}
