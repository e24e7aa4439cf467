use crate::entities::EventStatus;
use crate::framework::{DatabaseAccessor, DatabaseProcessor};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

/// Rows per multi-row INSERT. Each row binds 6 parameters and Postgres
/// accepts at most 65535 per statement.
const INSERT_CHUNK: usize = 1_000;

/// A chain event recorded in the ledger.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BlockchainEvent {
    pub id: Uuid,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: EventStatus,
    pub retry_count: i32,
    pub next_retry_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub processed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl BlockchainEvent {
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Application order of ledger rows.
///
/// Derived `Ord` compares `block_number` first, then `log_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventPosition {
    pub block_number: i64,
    pub log_index: i64,
}

impl std::fmt::Display for EventPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.block_number, self.log_index)
    }
}

/// Data for inserting a newly observed chain event.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockchainEventInsert {
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub processed: u64,
    pub failed: u64,
}

/// Outcome of a failed handler attempt, written back to the row.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureUpdate {
    pub retry_count: i32,
    /// `Pending` while retries remain, `Failed` once exhausted.
    pub status: EventStatus,
    pub next_retry_at: Option<OffsetDateTime>,
    pub last_error: String,
    pub updated_at: OffsetDateTime,
}

const RETURNING_COLUMNS: &str = r#"
    id,
    tx_hash,
    log_index,
    block_number,
    event_type,
    payload,
    status,
    retry_count,
    next_retry_at,
    last_error,
    processed_at,
    created_at,
    updated_at
"#;

impl BlockchainEvent {
    /// Insert events, skipping any whose `(tx_hash, log_index)` already exists.
    ///
    /// Returns the number of rows actually inserted (excluding duplicates).
    #[tracing::instrument(skip_all, err, name = "SQL:InsertManyBlockchainEvents")]
    pub async fn insert_many(
        db: &mut impl DatabaseAccessor,
        events: Vec<BlockchainEventInsert>,
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0u64;
        let mut remaining = events;

        while !remaining.is_empty() {
            let rest = remaining.split_off(remaining.len().min(INSERT_CHUNK));
            let chunk = std::mem::replace(&mut remaining, rest);

            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT INTO blockchain_events \
                (id, tx_hash, log_index, block_number, event_type, payload) ",
            );
            query_builder.push_values(chunk, |mut b, event| {
                b.push_bind(Uuid::now_v7())
                    .push_bind(event.tx_hash)
                    .push_bind(event.log_index)
                    .push_bind(event.block_number)
                    .push_bind(event.event_type)
                    .push_bind(event.payload);
            });
            query_builder.push(" ON CONFLICT (tx_hash, log_index) DO NOTHING");

            let result = query_builder.build().execute(db.acquire()).await?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }
}

#[derive(Debug, Clone)]
/// Claim due pending rows in application order.
///
/// Pushes `next_retry_at` of the selected rows to `lease_until` in the same
/// statement, so a concurrent claim skips them (`FOR UPDATE SKIP LOCKED`)
/// and a crashed claimer's rows come back once the lease expires.
///
/// Rows positioned after a pending row that is not yet due are left alone,
/// so a backed-off event is never overtaken by a later one.
pub struct ClaimDueBlockchainEvents {
    pub limit: u32,
    pub now: OffsetDateTime,
    pub lease_until: OffsetDateTime,
}

impl Processor<ClaimDueBlockchainEvents> for DatabaseProcessor {
    type Output = Vec<BlockchainEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClaimDueBlockchainEvents")]
    async fn process(
        &self,
        query: ClaimDueBlockchainEvents,
    ) -> Result<Vec<BlockchainEvent>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE blockchain_events
            SET next_retry_at = $3, updated_at = $2
            WHERE id IN (
                SELECT id
                FROM blockchain_events
                WHERE status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= $2)
                  AND NOT EXISTS (
                      SELECT 1
                      FROM blockchain_events AS waiting
                      WHERE waiting.status = 'pending'
                        AND waiting.next_retry_at > $2
                        AND (waiting.block_number, waiting.log_index)
                            < (blockchain_events.block_number, blockchain_events.log_index)
                  )
                ORDER BY block_number ASC, log_index ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {RETURNING_COLUMNS}
            "#
        );
        let mut rows = sqlx::query_as::<_, BlockchainEvent>(&sql)
            .bind(i64::from(query.limit))
            .bind(query.now)
            .bind(query.lease_until)
            .fetch_all(&self.pool)
            .await?;
        // RETURNING carries no ordering guarantee.
        rows.sort_by_key(BlockchainEvent::position);
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
/// Drop the claim on rows a batch did not get to, making them due again.
pub struct ReleaseBlockchainEventClaims {
    pub ids: Vec<Uuid>,
    pub now: OffsetDateTime,
}

impl Processor<ReleaseBlockchainEventClaims> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ReleaseBlockchainEventClaims")]
    async fn process(&self, cmd: ReleaseBlockchainEventClaims) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE blockchain_events
            SET next_retry_at = NULL, updated_at = $2
            WHERE id = ANY($1) AND status = 'pending'
            "#,
        )
        .bind(cmd.ids)
        .bind(cmd.now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Mark a claimed row as applied.
///
/// Returns false when the row was no longer pending.
pub struct MarkBlockchainEventProcessed {
    pub id: Uuid,
    pub now: OffsetDateTime,
}

impl Processor<MarkBlockchainEventProcessed> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkBlockchainEventProcessed")]
    async fn process(&self, cmd: MarkBlockchainEventProcessed) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE blockchain_events
            SET status = 'processed',
                next_retry_at = NULL,
                last_error = NULL,
                processed_at = $2,
                updated_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(cmd.id)
        .bind(cmd.now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Record a failed handler attempt on a claimed row.
///
/// Returns false when the row was no longer pending.
pub struct RecordBlockchainEventFailure {
    pub id: Uuid,
    pub update: FailureUpdate,
}

impl Processor<RecordBlockchainEventFailure> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordBlockchainEventFailure")]
    async fn process(&self, cmd: RecordBlockchainEventFailure) -> Result<bool, sqlx::Error> {
        let RecordBlockchainEventFailure { id, update } = cmd;
        let result = sqlx::query(
            r#"
            UPDATE blockchain_events
            SET status = $2,
                retry_count = $3,
                next_retry_at = $4,
                last_error = $5,
                updated_at = $6
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(update.status)
        .bind(update.retry_count)
        .bind(update.next_retry_at)
        .bind(update.last_error)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Count ledger rows per status.
pub struct CountBlockchainEventsByStatus;

impl Processor<CountBlockchainEventsByStatus> for DatabaseProcessor {
    type Output = StatusCounts;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CountBlockchainEventsByStatus")]
    async fn process(&self, _query: CountBlockchainEventsByStatus) -> Result<StatusCounts, sqlx::Error> {
        let rows: Vec<(EventStatus, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM blockchain_events
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match status {
                EventStatus::Pending => counts.pending = count,
                EventStatus::Processed => counts.processed = count,
                EventStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}

#[derive(Debug, Clone)]
/// Reset terminal rows to `pending` for another round of retries.
///
/// `ids = None` requeues every failed row. Returns the number of rows reset.
pub struct RequeueFailedBlockchainEvents {
    pub ids: Option<Vec<Uuid>>,
    pub now: OffsetDateTime,
}

impl Processor<RequeueFailedBlockchainEvents> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RequeueFailedBlockchainEvents")]
    async fn process(&self, cmd: RequeueFailedBlockchainEvents) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE blockchain_events
            SET status = 'pending',
                retry_count = 0,
                next_retry_at = NULL,
                last_error = NULL,
                updated_at = $2
            WHERE status = 'failed'
              AND ($1::uuid[] IS NULL OR id = ANY($1))
            "#,
        )
        .bind(cmd.ids)
        .bind(cmd.now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
