use super::{LedgerStore, StoreError};
use crate::entities::EventStatus;
use crate::entities::blockchain_event::{
    BlockchainEvent, BlockchainEventInsert, FailureUpdate, StatusCounts,
};
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process [`LedgerStore`].
///
/// Holds the same invariants as the Postgres store under a single mutex,
/// which makes every operation trivially atomic. Nothing survives a
/// restart unless the same instance is reused.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryLedger>,
}

#[derive(Default)]
struct MemoryLedger {
    rows: Vec<BlockchainEvent>,
    checkpoint: Option<i64>,
    unavailable: bool,
}

impl MemoryLedger {
    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory ledger marked unavailable".to_string()));
        }
        Ok(())
    }

    fn pending_row(&mut self, id: Uuid) -> Option<&mut BlockchainEvent> {
        self.rows
            .iter_mut()
            .find(|row| row.id == id && row.status == EventStatus::Pending)
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with [`StoreError::Unavailable`]
    /// until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// Copy of all rows in insertion order.
    pub async fn rows(&self) -> Vec<BlockchainEvent> {
        self.inner.lock().await.rows.clone()
    }

    pub async fn row(&self, tx_hash: &str, log_index: i64) -> Option<BlockchainEvent> {
        self.inner
            .lock()
            .await
            .rows
            .iter()
            .find(|row| row.tx_hash == tx_hash && row.log_index == log_index)
            .cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn checkpoint(&self) -> Result<Option<i64>, StoreError> {
        let ledger = self.inner.lock().await;
        ledger.ensure_available()?;
        Ok(ledger.checkpoint)
    }

    async fn ingest(
        &self,
        events: Vec<BlockchainEventInsert>,
        through_block: i64,
    ) -> Result<u64, StoreError> {
        let mut ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let now = OffsetDateTime::now_utc();
        let mut inserted = 0u64;
        for event in events {
            let exists = ledger
                .rows
                .iter()
                .any(|row| row.tx_hash == event.tx_hash && row.log_index == event.log_index);
            if exists {
                continue;
            }
            ledger.rows.push(BlockchainEvent {
                id: Uuid::now_v7(),
                tx_hash: event.tx_hash,
                log_index: event.log_index,
                block_number: event.block_number,
                event_type: event.event_type,
                payload: event.payload,
                status: EventStatus::Pending,
                retry_count: 0,
                next_retry_at: None,
                last_error: None,
                processed_at: None,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        ledger.checkpoint = Some(ledger.checkpoint.map_or(through_block, |c| c.max(through_block)));
        Ok(inserted)
    }

    async fn claim_due(
        &self,
        limit: u32,
        now: OffsetDateTime,
        lease_until: OffsetDateTime,
    ) -> Result<Vec<BlockchainEvent>, StoreError> {
        let mut ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let barrier = ledger
            .rows
            .iter()
            .filter(|row| row.status == EventStatus::Pending && row.next_retry_at.is_some_and(|at| at > now))
            .map(BlockchainEvent::position)
            .min();
        let mut due: Vec<&mut BlockchainEvent> = ledger
            .rows
            .iter_mut()
            .filter(|row| {
                row.status == EventStatus::Pending
                    && row.next_retry_at.is_none_or(|at| at <= now)
                    && barrier.is_none_or(|barrier| row.position() < barrier)
            })
            .collect();
        due.sort_by_key(|row| row.position());

        let claimed = due
            .into_iter()
            .take(limit as usize)
            .map(|row| {
                row.next_retry_at = Some(lease_until);
                row.updated_at = now;
                row.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn release_claims(&self, ids: Vec<Uuid>, now: OffsetDateTime) -> Result<u64, StoreError> {
        let mut ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let mut released = 0u64;
        for row in ledger.rows.iter_mut() {
            if row.status == EventStatus::Pending && ids.contains(&row.id) {
                row.next_retry_at = None;
                row.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn mark_processed(&self, id: Uuid, now: OffsetDateTime) -> Result<bool, StoreError> {
        let mut ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let Some(row) = ledger.pending_row(id) else {
            return Ok(false);
        };
        row.status = EventStatus::Processed;
        row.next_retry_at = None;
        row.last_error = None;
        row.processed_at = Some(now);
        row.updated_at = now;
        Ok(true)
    }

    async fn record_failure(&self, id: Uuid, update: FailureUpdate) -> Result<bool, StoreError> {
        let mut ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let Some(row) = ledger.pending_row(id) else {
            return Ok(false);
        };
        row.status = update.status;
        row.retry_count = update.retry_count;
        row.next_retry_at = update.next_retry_at;
        row.last_error = Some(update.last_error);
        row.updated_at = update.updated_at;
        Ok(true)
    }

    async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let mut counts = StatusCounts::default();
        for row in &ledger.rows {
            match row.status {
                EventStatus::Pending => counts.pending += 1,
                EventStatus::Processed => counts.processed += 1,
                EventStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn requeue_failed(
        &self,
        ids: Option<Vec<Uuid>>,
        now: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let mut ledger = self.inner.lock().await;
        ledger.ensure_available()?;

        let mut requeued = 0u64;
        for row in ledger.rows.iter_mut() {
            let selected = ids.as_ref().is_none_or(|ids| ids.contains(&row.id));
            if row.status == EventStatus::Failed && selected {
                row.status = EventStatus::Pending;
                row.retry_count = 0;
                row.next_retry_at = None;
                row.last_error = None;
                row.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}
