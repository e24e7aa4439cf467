//! Application state shared across all request handlers.

use ledger_ingest_core::supervisor::IngestSupervisor;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Blockchain listener. Present even when it failed to start, so health
    /// can report why.
    pub supervisor: Arc<IngestSupervisor>,
}

impl AppState {
    pub fn new(db: PgPool, supervisor: Arc<IngestSupervisor>) -> Self {
        Self { db, supervisor }
    }
}
