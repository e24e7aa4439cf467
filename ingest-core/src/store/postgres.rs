use super::{LedgerStore, StoreError};
use crate::entities::blockchain_event::{
    BlockchainEvent, BlockchainEventInsert, ClaimDueBlockchainEvents,
    CountBlockchainEventsByStatus, FailureUpdate, MarkBlockchainEventProcessed,
    RecordBlockchainEventFailure, ReleaseBlockchainEventClaims, RequeueFailedBlockchainEvents, StatusCounts,
};
use crate::entities::listener_checkpoint::{GetListenerCheckpoint, ListenerCheckpoint};
use crate::framework::{DatabaseProcessor, TransactionProcessor};
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

/// Checkpoint key used when none is given.
pub const DEFAULT_LISTENER: &str = "blockchain_listener";

/// Postgres-backed [`LedgerStore`].
#[derive(Clone)]
pub struct PgLedgerStore {
    db: DatabaseProcessor,
    listener: String,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_listener(pool, DEFAULT_LISTENER)
    }

    /// Use a distinct checkpoint row, e.g. one per contract.
    pub fn with_listener(pool: PgPool, listener: impl Into<String>) -> Self {
        Self {
            db: DatabaseProcessor { pool },
            listener: listener.into(),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn checkpoint(&self) -> Result<Option<i64>, StoreError> {
        let block = self
            .db
            .process(GetListenerCheckpoint {
                listener: self.listener.clone(),
            })
            .await?;
        Ok(block)
    }

    async fn ingest(
        &self,
        events: Vec<BlockchainEventInsert>,
        through_block: i64,
    ) -> Result<u64, StoreError> {
        let observed = events.len();
        let mut tx = TransactionProcessor::begin(&self.db.pool).await?;
        let inserted = BlockchainEvent::insert_many(&mut tx, events).await?;
        ListenerCheckpoint::advance(&mut tx, &self.listener, through_block).await?;
        tx.commit().await?;

        debug!(
            listener = %self.listener,
            observed,
            inserted,
            through_block,
            "Ingested block range"
        );
        Ok(inserted)
    }

    async fn claim_due(
        &self,
        limit: u32,
        now: OffsetDateTime,
        lease_until: OffsetDateTime,
    ) -> Result<Vec<BlockchainEvent>, StoreError> {
        let rows = self
            .db
            .process(ClaimDueBlockchainEvents {
                limit,
                now,
                lease_until,
            })
            .await?;
        Ok(rows)
    }

    async fn release_claims(&self, ids: Vec<Uuid>, now: OffsetDateTime) -> Result<u64, StoreError> {
        let released = self
            .db
            .process(ReleaseBlockchainEventClaims { ids, now })
            .await?;
        Ok(released)
    }

    async fn mark_processed(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let updated = self
            .db
            .process(MarkBlockchainEventProcessed { id, now })
            .await?;
        Ok(updated)
    }

    async fn record_failure(&self, id: Uuid, update: FailureUpdate) -> Result<bool, StoreError> {
        let updated = self
            .db
            .process(RecordBlockchainEventFailure { id, update })
            .await?;
        Ok(updated)
    }

    async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let counts = self.db.process(CountBlockchainEventsByStatus).await?;
        Ok(counts)
    }

    async fn requeue_failed(
        &self,
        ids: Option<Vec<Uuid>>,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let requeued = self
            .db
            .process(RequeueFailedBlockchainEvents { ids, now })
            .await?;
        Ok(requeued)
    }
}
