//! Event type definitions.
//!
//! Events are ephemeral wake-up signals. They carry block bounds rather than
//! rows; consumers always re-read pending work from the ledger store.

/// Emitted by the chain poller after a poll cycle inserted new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestTick {
    pub from_block: i64,
    pub to_block: i64,
    pub inserted: u64,
}
