//! `DomainHandler` implementations.
//!
//! Each handler runs in one transaction that row-locks the batch and records
//! the event's position on it. An event at or before the recorded position
//! was applied before (the ledger row update was lost, or a later event
//! already landed), so the handler succeeds without writing.

use super::args::{first_arg, parse_address, parse_batch_id};
use super::batches::{BatchChainState, FindUserByWallet};
use async_trait::async_trait;
use kanau::processor::Processor;
use ledger_ingest_core::framework::{DatabaseProcessor, TransactionProcessor};
use ledger_ingest_core::handlers::{DomainError, DomainHandler, HandlerInput};
use tracing::{debug, info};
use uuid::Uuid;

const BATCH_ID_ARGS: &[&str] = &["batchId", "batch_id"];
const NEW_OWNER_ARGS: &[&str] = &["to", "newOwner", "to_addr"];

/// Lock the batch, or report it missing so the event is retried later.
async fn lock_batch(
    tx: &mut TransactionProcessor<'static>,
    batch_id: Uuid,
) -> Result<BatchChainState, DomainError> {
    BatchChainState::lock(tx, batch_id)
        .await?
        .ok_or_else(|| DomainError::MissingDependency(format!("batch {batch_id} not found")))
}

pub struct BatchMintedHandler {
    db: DatabaseProcessor,
}

impl BatchMintedHandler {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DomainHandler for BatchMintedHandler {
    async fn handle(&self, input: HandlerInput<'_>) -> Result<(), DomainError> {
        let batch_id = parse_batch_id(first_arg(&input, BATCH_ID_ARGS)?)?;

        let mut tx = TransactionProcessor::begin(&self.db.pool).await?;
        let batch = lock_batch(&mut tx, batch_id).await?;
        if batch.has_applied(input.tx_hash, input.position()) {
            debug!(%batch_id, tx_hash = input.tx_hash, position = %input.position(), "BatchMinted already applied");
            return Ok(());
        }

        BatchChainState::mark_minted(&mut tx, batch_id, input.tx_hash, input.position()).await?;
        tx.commit().await?;
        info!(%batch_id, tx_hash = input.tx_hash, "Batch minted on chain");
        Ok(())
    }
}

pub struct OwnershipTransferredHandler {
    db: DatabaseProcessor,
}

impl OwnershipTransferredHandler {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DomainHandler for OwnershipTransferredHandler {
    async fn handle(&self, input: HandlerInput<'_>) -> Result<(), DomainError> {
        let batch_id = parse_batch_id(first_arg(&input, BATCH_ID_ARGS)?)?;
        let new_owner = parse_address(first_arg(&input, NEW_OWNER_ARGS)?)?;

        let owner_id = self
            .db
            .process(FindUserByWallet {
                wallet_address: new_owner.clone(),
            })
            .await?
            .ok_or_else(|| DomainError::MissingDependency(format!("no user with wallet {new_owner}")))?;

        let mut tx = TransactionProcessor::begin(&self.db.pool).await?;
        let batch = lock_batch(&mut tx, batch_id).await?;
        if batch.has_applied(input.tx_hash, input.position()) {
            debug!(%batch_id, tx_hash = input.tx_hash, position = %input.position(), "OwnershipTransferred already applied");
            return Ok(());
        }

        BatchChainState::transfer(&mut tx, batch_id, owner_id, input.tx_hash, input.position()).await?;
        tx.commit().await?;
        info!(%batch_id, %owner_id, tx_hash = input.tx_hash, "Batch ownership transferred");
        Ok(())
    }
}
