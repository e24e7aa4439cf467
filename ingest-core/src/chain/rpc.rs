//! Ethereum JSON-RPC backed [`ChainClient`].

use super::decode::{LogDecoder, RpcLog, parse_quantity};
use super::{ChainClient, ChainError, RawEvent};
use crate::config::ChainConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Reads block height and contract logs over HTTP JSON-RPC.
pub struct JsonRpcChainClient {
    url: Url,
    contract_address: Option<String>,
    decoder: LogDecoder,
    http_client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcChainClient {
    pub fn new(url: Url, config: &ChainConfig) -> Result<Self, reqwest::Error> {
        // The per-call timeout is enforced in `call`; this is a backstop
        // for connections that never complete.
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout.saturating_mul(2))
            .build()?;
        Ok(Self {
            url,
            contract_address: config.contract_address.as_ref().map(|a| a.to_lowercase()),
            decoder: LogDecoder::new(config.events.clone()),
            http_client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let request = async {
            let response = self
                .http_client
                .post(self.url.clone())
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            let text = response.text().await?;
            Ok::<_, ChainError>(text)
        };
        let text = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ChainError::Timeout(timeout))??;

        let response: RpcResponse<T> = serde_json::from_str(&text)
            .map_err(|e| ChainError::Malformed(format!("{method}: {e}")))?;
        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| ChainError::Malformed(format!("{method}: response without result")))
    }

    fn log_filter(&self, from_block: i64, to_block: i64) -> Value {
        let mut filter = json!({
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
        });
        if let Some(address) = &self.contract_address {
            filter["address"] = json!(address);
        }
        let topics = self.decoder.topics();
        if !topics.is_empty() {
            filter["topics"] = json!([topics]);
        }
        filter
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn current_block_number(&self, timeout: Duration) -> Result<i64, ChainError> {
        let quantity: String = self.call("eth_blockNumber", json!([]), timeout).await?;
        parse_quantity(&quantity)
    }

    async fn get_logs(
        &self,
        from_block: i64,
        to_block: i64,
        timeout: Duration,
    ) -> Result<Vec<RawEvent>, ChainError> {
        let filter = self.log_filter(from_block, to_block);
        let logs: Vec<RpcLog> = self.call("eth_getLogs", json!([filter]), timeout).await?;
        debug!(from_block, to_block, logs = logs.len(), "Fetched chain logs");

        let events = self.decoder.decode_all(logs)?;
        if let Some(stray) = events
            .iter()
            .find(|e| e.block_number < from_block || e.block_number > to_block)
        {
            return Err(ChainError::Malformed(format!(
                "log at block {} outside requested range [{from_block}, {to_block}]",
                stray.block_number
            )));
        }
        Ok(events)
    }
}
