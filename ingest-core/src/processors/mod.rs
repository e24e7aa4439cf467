//! Pipeline processors.
//!
//! - `ChainPoller`: polls the chain through the breaker, ingests into the ledger, emits `IngestTick`
//! - `EventProcessor`: claims due ledger rows and applies them through domain handlers
//! - `RetryScheduler`: receives `IngestTick` and runs on its own cadence, drives `EventProcessor`

pub mod chain_poller;
pub mod event_processor;
pub mod retry_scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use chain_poller::{ChainPoller, PollError, PollOutcome, SkipReason};
pub use event_processor::{BatchReport, EventProcessor, ProcessError};
pub use retry_scheduler::RetryScheduler;
