//! Domain handlers for the batch-tracking application.
//!
//! The ingestion core hands every ledger row to the handler registered for
//! its event type. The handlers here project `BatchMinted` and
//! `OwnershipTransferred` onto the `batches` table.

pub mod args;
pub mod batches;
pub mod handlers;

use ledger_ingest_core::framework::DatabaseProcessor;
use ledger_ingest_core::handlers::HandlerRegistry;
use std::sync::Arc;

pub const BATCH_MINTED: &str = "BatchMinted";
pub const OWNERSHIP_TRANSFERRED: &str = "OwnershipTransferred";

/// Registry with every handler this application provides.
pub fn registry(db: DatabaseProcessor) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(BATCH_MINTED, Arc::new(handlers::BatchMintedHandler::new(db.clone())))
        .with(
            OWNERSHIP_TRANSFERRED,
            Arc::new(handlers::OwnershipTransferredHandler::new(db)),
        )
}
