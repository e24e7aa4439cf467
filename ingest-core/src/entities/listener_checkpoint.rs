use crate::framework::{DatabaseAccessor, DatabaseProcessor};
use kanau::processor::Processor;

/// Highest block whose events are durably ingested, per listener.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ListenerCheckpoint {
    pub listener: String,
    pub last_processed_block: i64,
    pub updated_at: time::OffsetDateTime,
}

impl ListenerCheckpoint {
    /// Move the checkpoint forward to `block`. Never moves it backwards.
    ///
    /// Meant to run in the same transaction as the insert it covers.
    #[tracing::instrument(skip_all, err, name = "SQL:AdvanceListenerCheckpoint")]
    pub async fn advance(
        db: &mut impl DatabaseAccessor,
        listener: &str,
        block: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO listener_checkpoints (listener, last_processed_block, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (listener) DO UPDATE
            SET last_processed_block = GREATEST(
                    listener_checkpoints.last_processed_block,
                    EXCLUDED.last_processed_block
                ),
                updated_at = NOW()
            "#,
        )
        .bind(listener)
        .bind(block)
        .execute(db.acquire())
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Read the checkpoint of a listener. `None` before its first ingest.
pub struct GetListenerCheckpoint {
    pub listener: String,
}

impl Processor<GetListenerCheckpoint> for DatabaseProcessor {
    type Output = Option<i64>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetListenerCheckpoint")]
    async fn process(&self, query: GetListenerCheckpoint) -> Result<Option<i64>, sqlx::Error> {
        let block = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT last_processed_block
            FROM listener_checkpoints
            WHERE listener = $1
            "#,
        )
        .bind(query.listener)
        .fetch_optional(&self.pool)
        .await?;
        Ok(block)
    }
}
