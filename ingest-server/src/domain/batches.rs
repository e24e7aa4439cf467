//! SQL commands on the application tables touched by event handlers.

use kanau::processor::Processor;
use ledger_ingest_core::entities::blockchain_event::EventPosition;
use ledger_ingest_core::framework::{DatabaseAccessor, DatabaseProcessor};
use uuid::Uuid;

/// Batch status as stored in Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "batch_status")]
pub enum BatchStatus {
    Created,
    InTransit,
    Delivered,
    Received,
    Rejected,
}

/// The columns event handlers read from a batch.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BatchChainState {
    pub id: Uuid,
    pub current_owner_id: Uuid,
    pub blockchain_tx_hash: Option<String>,
    pub status: BatchStatus,
    pub chain_block_number: Option<i64>,
    pub chain_log_index: Option<i64>,
}

impl BatchChainState {
    /// Position of the last chain event applied to the batch.
    pub fn applied_through(&self) -> Option<EventPosition> {
        Some(EventPosition {
            block_number: self.chain_block_number?,
            log_index: self.chain_log_index?,
        })
    }

    /// Whether the event from `tx_hash` at `position` is already reflected.
    ///
    /// Events apply in position order, so anything at or before the last
    /// applied position is done. The hash check covers batches written
    /// before positions were recorded.
    pub fn has_applied(&self, tx_hash: &str, position: EventPosition) -> bool {
        self.applied_through().is_some_and(|applied| position <= applied)
            || self.blockchain_tx_hash.as_deref() == Some(tx_hash)
    }

    /// Read and row-lock a batch for the rest of the transaction.
    #[tracing::instrument(skip_all, err, name = "SQL:LockBatchForUpdate")]
    pub async fn lock(
        db: &mut impl DatabaseAccessor,
        batch_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT id, current_owner_id, blockchain_tx_hash, status, chain_block_number, chain_log_index
            FROM batches
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(batch_id)
        .fetch_optional(db.acquire())
        .await
    }

    #[tracing::instrument(skip_all, err, name = "SQL:MarkBatchMinted")]
    pub async fn mark_minted(
        db: &mut impl DatabaseAccessor,
        batch_id: Uuid,
        tx_hash: &str,
        position: EventPosition,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE batches
            SET blockchain_tx_hash = $2,
                status = $3,
                chain_block_number = $4,
                chain_log_index = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(tx_hash)
        .bind(BatchStatus::Created)
        .bind(position.block_number)
        .bind(position.log_index)
        .execute(db.acquire())
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:TransferBatchOwnership")]
    pub async fn transfer(
        db: &mut impl DatabaseAccessor,
        batch_id: Uuid,
        new_owner_id: Uuid,
        tx_hash: &str,
        position: EventPosition,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE batches
            SET current_owner_id = $2,
                blockchain_tx_hash = $3,
                status = $4,
                chain_block_number = $5,
                chain_log_index = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(new_owner_id)
        .bind(tx_hash)
        .bind(BatchStatus::InTransit)
        .bind(position.block_number)
        .bind(position.log_index)
        .execute(db.acquire())
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Find a user by wallet address, case-insensitively.
pub struct FindUserByWallet {
    pub wallet_address: String,
}

impl Processor<FindUserByWallet> for DatabaseProcessor {
    type Output = Option<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindUserByWallet")]
    async fn process(&self, query: FindUserByWallet) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM users
            WHERE LOWER(wallet_address) = LOWER($1)
            "#,
        )
        .bind(query.wallet_address)
        .fetch_optional(&self.pool)
        .await
    }
}
