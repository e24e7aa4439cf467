//! Domain handler seam.
//!
//! The application registers one [`DomainHandler`] per event type. The
//! event processor looks handlers up by the row's `event_type` and treats
//! any [`DomainError`] as retryable.

use crate::entities::blockchain_event::EventPosition;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// The payload lacks a field or carries a value the handler cannot read
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The entity the event refers to does not exist (yet)
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("handler timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Identity and content of the event being applied.
///
/// `tx_hash` and `log_index` identify the event uniquely, so handlers can
/// detect that they already applied it.
#[derive(Debug, Clone, Copy)]
pub struct HandlerInput<'a> {
    pub tx_hash: &'a str,
    pub log_index: i64,
    pub block_number: i64,
    pub event_type: &'a str,
    pub payload: &'a Value,
}

impl<'a> HandlerInput<'a> {
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    /// Named event argument as a string.
    pub fn arg(&self, name: &str) -> Result<&'a str, DomainError> {
        self.payload
            .get("args")
            .and_then(|args| args.get(name))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DomainError::InvalidPayload(format!("{} event without {name}", self.event_type))
            })
    }
}

/// Applies one event type to domain state.
///
/// Invocations may repeat for the same event (after a crash or a failed
/// status update), so the effect must be idempotent.
#[async_trait]
pub trait DomainHandler: Send + Sync {
    async fn handle(&self, input: HandlerInput<'_>) -> Result<(), DomainError>;
}

/// Handlers keyed by event type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn DomainHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`, replacing any previous one.
    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn DomainHandler>) {
        self.handlers.insert(event_type.into(), handler);
    }

    pub fn with(mut self, event_type: impl Into<String>, handler: Arc<dyn DomainHandler>) -> Self {
        self.register(event_type, handler);
        self
    }

    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn DomainHandler>> {
        self.handlers.get(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl DomainHandler for Noop {
        async fn handle(&self, _input: HandlerInput<'_>) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::new().with("BatchMinted", Arc::new(Noop));
        assert!(registry.get("BatchMinted").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.event_types().collect::<Vec<_>>(), vec!["BatchMinted"]);
    }

    #[test]
    fn test_input_arg() {
        let payload = json!({"args": {"batchId": "0x01", "count": 3}});
        let input = HandlerInput {
            tx_hash: "0xaa",
            log_index: 0,
            block_number: 1,
            event_type: "BatchMinted",
            payload: &payload,
        };
        assert_eq!(input.arg("batchId").unwrap(), "0x01");
        assert!(matches!(input.arg("count"), Err(DomainError::InvalidPayload(_))));
        assert!(matches!(input.arg("missing"), Err(DomainError::InvalidPayload(_))));
    }
}
