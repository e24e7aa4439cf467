//! Normalization of `eth_getLogs` results into [`RawEvent`]s.

use super::{ChainError, RawEvent};
use crate::config::EventSpec;
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Event type stored for logs whose `topic0` is not configured.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// A log object as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<i64, ChainError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Malformed(format!("quantity without 0x prefix: {value}")))?;
    i64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Malformed(format!("invalid quantity {value}: {e}")))
}

/// Maps logs onto configured event types.
#[derive(Debug, Clone, Default)]
pub struct LogDecoder {
    events: Vec<EventSpec>,
}

impl LogDecoder {
    pub fn new(events: Vec<EventSpec>) -> Self {
        Self { events }
    }

    /// Configured `topic0` values, for the `eth_getLogs` topic filter.
    pub fn topics(&self) -> Vec<String> {
        self.events.iter().map(|e| e.topic0.to_lowercase()).collect()
    }

    /// Normalize a whole response. Any malformed log fails the batch, so
    /// a partial range is never ingested. Logs flagged `removed` (reorged
    /// out) are dropped.
    pub fn decode_all(&self, logs: Vec<RpcLog>) -> Result<Vec<RawEvent>, ChainError> {
        logs.into_iter()
            .filter(|log| !log.removed)
            .map(|log| self.decode(log))
            .collect()
    }

    pub fn decode(&self, log: RpcLog) -> Result<RawEvent, ChainError> {
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| ChainError::Malformed("log without transactionHash".to_string()))?;
        let log_index = parse_quantity(
            log.log_index
                .as_deref()
                .ok_or_else(|| ChainError::Malformed(format!("log {tx_hash} without logIndex")))?,
        )?;
        let block_number = parse_quantity(
            log.block_number
                .as_deref()
                .ok_or_else(|| ChainError::Malformed(format!("log {tx_hash} without blockNumber")))?,
        )?;

        let spec = log.topics.first().and_then(|topic0| {
            self.events
                .iter()
                .find(|spec| spec.topic0.eq_ignore_ascii_case(topic0))
        });
        let event_type = spec.map_or(UNKNOWN_EVENT_TYPE, |spec| spec.name.as_str()).to_string();
        let args = match spec {
            Some(spec) => decode_args(spec, &log.topics, &log.data)?,
            None => Map::new(),
        };

        Ok(RawEvent {
            tx_hash: tx_hash.to_lowercase(),
            log_index,
            block_number,
            event_type,
            payload: json!({
                "address": log.address.to_lowercase(),
                "topics": log.topics,
                "data": log.data,
                "args": args,
            }),
        })
    }
}

/// Assign parameter names to indexed topics, then to 32-byte data words.
/// Values stay as `0x`-prefixed 32-byte words; handlers interpret them.
fn decode_args(spec: &EventSpec, topics: &[String], data: &str) -> Result<Map<String, Value>, ChainError> {
    let data = data.strip_prefix("0x").unwrap_or(data);
    if data.len() % 64 != 0 || !data.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChainError::Malformed(format!(
            "log data of {} is not a sequence of 32-byte words",
            spec.name
        )));
    }

    let indexed = topics.iter().skip(1).map(|t| t.to_lowercase());
    let words = data
        .as_bytes()
        .chunks(64)
        .map(|word| format!("0x{}", String::from_utf8_lossy(word).to_lowercase()));

    Ok(spec
        .params
        .iter()
        .cloned()
        .zip(indexed.chain(words).map(Value::String))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minted_spec() -> EventSpec {
        EventSpec {
            name: "BatchMinted".to_string(),
            topic0: format!("0x{}", "aa".repeat(32)),
            params: vec!["batchId".to_string(), "metadataCid".to_string()],
        }
    }

    fn log(topics: Vec<String>, data: &str) -> RpcLog {
        RpcLog {
            address: "0xABCDEF".to_string(),
            topics,
            data: data.to_string(),
            block_number: Some("0x64".to_string()),
            transaction_hash: Some("0xDEAD".to_string()),
            log_index: Some("0x2".to_string()),
            removed: false,
        }
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x69").unwrap(), 105);
        assert!(parse_quantity("105").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_decodes_known_event_args() {
        let decoder = LogDecoder::new(vec![minted_spec()]);
        let batch_word = format!("0x{}", "01".repeat(32));
        let data = format!("0x{}", "02".repeat(32));
        let event = decoder
            .decode(log(vec![minted_spec().topic0, batch_word.clone()], &data))
            .unwrap();

        assert_eq!(event.event_type, "BatchMinted");
        assert_eq!(event.block_number, 100);
        assert_eq!(event.log_index, 2);
        assert_eq!(event.tx_hash, "0xdead");
        assert_eq!(event.payload["args"]["batchId"], batch_word);
        assert_eq!(event.payload["args"]["metadataCid"], data);
        assert_eq!(event.payload["address"], "0xabcdef");
    }

    #[test]
    fn test_unknown_topic_keeps_raw_log() {
        let decoder = LogDecoder::new(vec![minted_spec()]);
        let event = decoder
            .decode(log(vec![format!("0x{}", "bb".repeat(32))], "0x"))
            .unwrap();
        assert_eq!(event.event_type, UNKNOWN_EVENT_TYPE);
        assert!(event.payload["args"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_missing_position_is_malformed() {
        let decoder = LogDecoder::default();
        let mut broken = log(vec![], "0x");
        broken.log_index = None;
        assert!(matches!(decoder.decode(broken), Err(ChainError::Malformed(_))));
    }

    #[test]
    fn test_one_bad_log_fails_the_batch_and_removed_logs_are_dropped() {
        let decoder = LogDecoder::new(vec![minted_spec()]);
        let mut removed = log(vec![], "0x");
        removed.removed = true;
        removed.block_number = None;
        assert!(decoder.decode_all(vec![removed]).unwrap().is_empty());

        let ragged = log(vec![minted_spec().topic0], "0x1234");
        assert!(decoder.decode_all(vec![log(vec![], "0x"), ragged]).is_err());
    }
}
