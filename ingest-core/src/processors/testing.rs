//! Scripted collaborators for pipeline tests.

use crate::chain::{ChainClient, ChainError, RawEvent};
use crate::entities::blockchain_event::{BlockchainEvent, BlockchainEventInsert, FailureUpdate, StatusCounts};
use crate::handlers::{DomainError, DomainHandler, HandlerInput};
use crate::store::{LedgerStore, StoreError};
use async_trait::async_trait;
use std::future::pending;
use time::OffsetDateTime;
use uuid::Uuid;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_EVENT_TYPE: &str = "Recorded";

pub fn raw_event(tx_hash: &str, log_index: i64, block_number: i64) -> RawEvent {
    RawEvent {
        tx_hash: tx_hash.to_string(),
        log_index,
        block_number,
        event_type: TEST_EVENT_TYPE.to_string(),
        payload: json!({ "args": { "tx": tx_hash } }),
    }
}

#[derive(Default)]
struct ChainScript {
    head: i64,
    logs: Vec<RawEvent>,
    log_requests: Vec<(i64, i64)>,
    head_calls: u32,
    failing_head_calls: u32,
    failing_log_calls: u32,
}

/// In-memory chain with programmable failures.
pub struct ScriptedChain {
    script: Mutex<ChainScript>,
}

impl ScriptedChain {
    pub fn new(head: i64) -> Self {
        Self {
            script: Mutex::new(ChainScript {
                head,
                ..ChainScript::default()
            }),
        }
    }

    pub fn set_head(&self, head: i64) {
        self.script.lock().unwrap().head = head;
    }

    pub fn add_logs(&self, logs: impl IntoIterator<Item = RawEvent>) {
        self.script.lock().unwrap().logs.extend(logs);
    }

    pub fn fail_next_head_calls(&self, count: u32) {
        self.script.lock().unwrap().failing_head_calls = count;
    }

    pub fn fail_next_log_calls(&self, count: u32) {
        self.script.lock().unwrap().failing_log_calls = count;
    }

    pub fn log_requests(&self) -> Vec<(i64, i64)> {
        self.script.lock().unwrap().log_requests.clone()
    }

    pub fn head_calls(&self) -> u32 {
        self.script.lock().unwrap().head_calls
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn current_block_number(&self, timeout: Duration) -> Result<i64, ChainError> {
        let mut script = self.script.lock().unwrap();
        script.head_calls += 1;
        if script.failing_head_calls > 0 {
            script.failing_head_calls -= 1;
            return Err(ChainError::Timeout(timeout));
        }
        Ok(script.head)
    }

    async fn get_logs(
        &self,
        from_block: i64,
        to_block: i64,
        _timeout: Duration,
    ) -> Result<Vec<RawEvent>, ChainError> {
        let mut script = self.script.lock().unwrap();
        script.log_requests.push((from_block, to_block));
        if script.failing_log_calls > 0 {
            script.failing_log_calls -= 1;
            return Err(ChainError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            });
        }
        Ok(script
            .logs
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log.block_number))
            .cloned()
            .collect())
    }
}

/// Records applied events in call order and fails on demand.
#[derive(Default)]
pub struct RecordingHandler {
    applied: Mutex<Vec<(String, i64)>>,
    /// Remaining failures per tx hash; `u32::MAX` fails forever.
    failures: Mutex<HashMap<String, u32>>,
}

impl RecordingHandler {
    pub fn fail(&self, tx_hash: &str, times: u32) {
        self.failures.lock().unwrap().insert(tx_hash.to_string(), times);
    }

    pub fn applied(&self) -> Vec<(String, i64)> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl DomainHandler for RecordingHandler {
    async fn handle(&self, input: HandlerInput<'_>) -> Result<(), DomainError> {
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(input.tx_hash) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(DomainError::MissingDependency(format!(
                        "batch for {} not found",
                        input.tx_hash
                    )));
                }
            }
        }
        self.applied
            .lock()
            .unwrap()
            .push((input.tx_hash.to_string(), input.log_index));
        Ok(())
    }
}

/// A ledger whose calls never complete, like a database that stopped answering.
pub struct StalledStore;

#[async_trait]
impl LedgerStore for StalledStore {
    async fn checkpoint(&self) -> Result<Option<i64>, StoreError> {
        pending().await
    }

    async fn ingest(&self, _events: Vec<BlockchainEventInsert>, _through_block: i64) -> Result<u64, StoreError> {
        pending().await
    }

    async fn claim_due(
        &self,
        _limit: u32,
        _now: OffsetDateTime,
        _lease_until: OffsetDateTime,
    ) -> Result<Vec<BlockchainEvent>, StoreError> {
        pending().await
    }

    async fn release_claims(&self, _ids: Vec<Uuid>, _now: OffsetDateTime) -> Result<u64, StoreError> {
        pending().await
    }

    async fn mark_processed(&self, _id: Uuid, _now: OffsetDateTime) -> Result<bool, StoreError> {
        pending().await
    }

    async fn record_failure(&self, _id: Uuid, _update: FailureUpdate) -> Result<bool, StoreError> {
        pending().await
    }

    async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        pending().await
    }

    async fn requeue_failed(&self, _ids: Option<Vec<Uuid>>, _now: OffsetDateTime) -> Result<u64, StoreError> {
        pending().await
    }
}
