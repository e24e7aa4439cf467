//! Lifecycle of the ingestion pipeline inside a host process.
//!
//! The supervisor owns the shared pieces (breaker, store, chain client) and
//! spawns three tasks that observe one `watch` shutdown channel:
//! the chain poller, the retry scheduler and a heartbeat logger.

use crate::breaker::CircuitBreaker;
use crate::chain::ChainClient;
use crate::config::{ConfigError, IngestConfig};
use crate::events::ingest_tick_channel;
use crate::handlers::HandlerRegistry;
use crate::health::HealthReporter;
use crate::processors::{ChainPoller, EventProcessor, RetryScheduler};
use crate::store::{LedgerStore, StoreError};
use ledger_ingest_sdk::objects::HealthSnapshot;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("blockchain listener is disabled")]
    Disabled,

    #[error("chain client is not configured")]
    ChainUnconfigured,
}

struct RunningTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct IngestSupervisor {
    config: IngestConfig,
    client: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    breaker: Arc<CircuitBreaker>,
    handlers: HandlerRegistry,
    reporter: HealthReporter,
    running: Mutex<Option<RunningTasks>>,
}

impl IngestSupervisor {
    /// Uptime is measured from this call.
    pub fn new(
        config: IngestConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn LedgerStore>,
        handlers: HandlerRegistry,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker));
        let reporter = HealthReporter::new(
            store.clone(),
            breaker.clone(),
            Instant::now(),
            config.processor.store_timeout,
        );
        Self {
            config,
            client,
            store,
            breaker,
            handlers,
            reporter,
            running: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Bound on a single ledger store call.
    pub fn store_timeout(&self) -> Duration {
        self.config.processor.store_timeout
    }

    /// Spawn the pipeline tasks. Returns `Ok(false)` if already running.
    pub async fn start(&self) -> Result<bool, SupervisorError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(false);
        }
        if !self.config.enabled {
            return Err(SupervisorError::Disabled);
        }
        self.config.validate()?;
        if !self.client.is_configured() {
            return Err(SupervisorError::ChainUnconfigured);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = ingest_tick_channel();

        let poller = Arc::new(ChainPoller::new(
            self.client.clone(),
            self.store.clone(),
            self.breaker.clone(),
            self.config.poller.clone(),
            self.config.chain.request_timeout,
        ));
        let processor = Arc::new(EventProcessor::new(
            self.store.clone(),
            self.handlers.clone(),
            self.config.processor.clone(),
        ));
        let scheduler = RetryScheduler::new(processor);

        let handles = vec![
            (
                "chain_poller",
                tokio::spawn(poller.run(self.config.poll_interval, shutdown_rx.clone(), Some(tick_tx))),
            ),
            (
                "retry_scheduler",
                tokio::spawn(scheduler.run(self.config.process_interval, shutdown_rx.clone(), tick_rx)),
            ),
            (
                "heartbeat",
                tokio::spawn(heartbeat(
                    self.reporter.clone(),
                    self.config.heartbeat_interval,
                    shutdown_rx,
                )),
            ),
        ];

        *running = Some(RunningTasks {
            shutdown_tx,
            handles,
        });
        info!(
            handlers = ?self.handlers.event_types().collect::<Vec<_>>(),
            "Blockchain listener started"
        );
        Ok(true)
    }

    /// Signal shutdown and wait for in-flight iterations to finish.
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(tasks) = self.running.lock().await.take() else {
            return false;
        };
        let _ = tasks.shutdown_tx.send(true);
        for (name, handle) in tasks.handles {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Listener task ended abnormally");
            }
        }
        info!("Blockchain listener stopped");
        true
    }

    /// True while started and every task is alive.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|tasks| tasks.handles.iter().all(|(_, handle)| !handle.is_finished()))
    }

    pub async fn health(&self) -> Result<HealthSnapshot, StoreError> {
        let running = self.is_running().await;
        self.reporter.snapshot(running).await
    }

    /// Chain liveness through the breaker, cached for the health TTL.
    pub async fn chain_healthy(&self) -> bool {
        if !self.client.is_configured() {
            return false;
        }
        let timeout = self.config.chain.request_timeout;
        self.breaker
            .health_check(|| self.client.current_block_number(timeout))
            .await
    }
}

async fn heartbeat(reporter: HealthReporter, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so startup logs stay quiet.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                match reporter.snapshot(true).await {
                    Ok(snapshot) => info!(
                        backlog_size = snapshot.backlog_size,
                        failed_count = snapshot.failed_count,
                        last_block = ?snapshot.last_block,
                        breaker_state = %snapshot.breaker_state,
                        uptime_seconds = snapshot.uptime_seconds,
                        "Blockchain listener heartbeat"
                    ),
                    Err(e) => warn!(error = %e, "Heartbeat could not read the ledger"),
                }
            }
        }
    }
}
