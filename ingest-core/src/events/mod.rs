//! Signals between pipeline tasks.
//!
//! # Event Flow
//!
//! 1. `ChainPoller` ingests a block range and emits `IngestTick`
//! 2. `RetryScheduler` receives it and drains due rows through `EventProcessor`
//!
//! The scheduler also runs on its own interval, so a lost tick only delays
//! processing by one period.

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, IngestTickReceiver, IngestTickSender, ingest_tick_channel};
pub use types::IngestTick;
