//! The Ledger Store: durable record of every chain event seen and of its
//! application status.
//!
//! [`LedgerStore`] is the only shared mutable resource of the pipeline.
//! [`PgLedgerStore`] backs it with Postgres; [`MemoryLedgerStore`] keeps the
//! same contract in process memory.

mod memory;
mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use crate::entities::blockchain_event::{
    BlockchainEvent, BlockchainEventInsert, FailureUpdate, StatusCounts,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors that can occur in ledger store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store refused the operation (e.g. it is shutting down)
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time
    #[error("ledger store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Durable ledger of ingested chain events.
///
/// Implementations must uphold:
/// - `(tx_hash, log_index)` is unique; inserting a duplicate is a silent no-op.
/// - `ingest` persists the events and advances the checkpoint atomically.
/// - `claim_due` is atomic: two concurrent claims never return the same row.
/// - `claim_due` never returns a row positioned after a pending row that is
///   not yet due.
/// - `mark_processed` / `record_failure` only touch rows still `pending`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Last block whose events are fully ingested.
    async fn checkpoint(&self) -> Result<Option<i64>, StoreError>;

    /// Insert `events` idempotently and move the checkpoint to
    /// `through_block`, as one unit. Returns the number of new rows.
    async fn ingest(
        &self,
        events: Vec<BlockchainEventInsert>,
        through_block: i64,
    ) -> Result<u64, StoreError>;

    /// Claim up to `limit` pending rows due at `now`, ordered by
    /// `(block_number, log_index)`, hiding them until `lease_until`.
    ///
    /// A pending row that is not yet due (backed off or claimed) holds back
    /// every row positioned after it.
    async fn claim_due(
        &self,
        limit: u32,
        now: OffsetDateTime,
        lease_until: OffsetDateTime,
    ) -> Result<Vec<BlockchainEvent>, StoreError>;

    /// Drop the claim on still-pending rows among `ids`, making them due.
    async fn release_claims(&self, ids: Vec<Uuid>, now: OffsetDateTime) -> Result<u64, StoreError>;

    /// Returns false if the row was not pending anymore.
    async fn mark_processed(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError>;

    /// Returns false if the row was not pending anymore.
    async fn record_failure(&self, id: Uuid, update: FailureUpdate) -> Result<bool, StoreError>;

    async fn status_counts(&self) -> Result<StatusCounts, StoreError>;

    /// Reset `failed` rows (all of them, or only `ids`) to `pending`.
    async fn requeue_failed(
        &self,
        ids: Option<Vec<Uuid>>,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError>;
}
