//! JSON-RPC chain client.
//!
//! Talks to an Ethereum-compatible node over HTTP using the standard
//! `eth_*` methods.

use crate::domain::{Address, BlockInfo, Hash, LogEntry};
use crate::ports::{ChainError, ChainReader, ChainWriter, TxReceipt};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Delay between `eth_getTransactionReceipt` polls.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    #[serde(default)]
    data: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl RpcLog {
    /// Entries that are not log objects become empty and fail decoding.
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| {
            debug!("[relay] Unparseable log entry: {}", e);
            Self::default()
        })
    }

    fn into_entry(self) -> LogEntry {
        LogEntry {
            block_number: self
                .block_number
                .as_deref()
                .and_then(|number| parse_quantity(number).ok()),
            data: self.data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    status: Option<String>,
    block_number: Option<String>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<TxReceipt, ChainError> {
        Ok(TxReceipt {
            tx_hash: parse_hash_field(&self.transaction_hash)?,
            // Pre-Byzantium receipts carry no status; treat as success.
            status: match self.status.as_deref() {
                Some(status) => parse_quantity(status)? == 1,
                None => true,
            },
            block_number: self.block_number.as_deref().map(parse_quantity).transpose()?,
        })
    }
}

/// Parse a hex quantity (`0x1a`).
pub fn parse_quantity(value: &str) -> Result<u64, ChainError> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {:?}: {}", value, e)))
}

/// Format a hex quantity.
pub fn to_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

fn parse_hash_field(value: &str) -> Result<Hash, ChainError> {
    crate::domain::parse_hash(value)
        .ok_or_else(|| ChainError::InvalidResponse(format!("bad hash {:?}", value)))
}

/// Map a node error message onto the chain error taxonomy.
pub fn classify_rpc_error(message: &str) -> ChainError {
    let lower = message.to_lowercase();
    if lower.contains("nonce too low")
        || lower.contains("already known")
        || lower.contains("replacement transaction")
    {
        ChainError::NonceConflict(message.to_string())
    } else if lower.contains("underpriced") {
        ChainError::Underpriced(message.to_string())
    } else if lower.contains("revert") || lower.contains("insufficient funds") {
        ChainError::Reverted(message.to_string())
    } else {
        ChainError::Unavailable(message.to_string())
    }
}

/// HTTP JSON-RPC client implementing both chain ports.
pub struct JsonRpcChainClient {
    client: Client,
    url: String,
    request_id: AtomicU64,
    receipt_timeout: Duration,
}

impl JsonRpcChainClient {
    /// Create a client for `url`.
    pub fn new(url: impl Into<String>, receipt_timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
            receipt_timeout,
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call a JSON-RPC method.
    async fn call<P: Serialize + Send, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ChainError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{} failed: {}", method, e)))?;

        if response.status().is_server_error() {
            return Err(ChainError::Unavailable(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let rpc: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = rpc.error {
            debug!(method, code = error.code, "[relay] RPC error: {}", error.message);
            return Err(classify_rpc_error(&error.message));
        }

        serde_json::from_value(rpc.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::InvalidResponse(format!("{}: {}", method, e)))
    }


    async fn wait_for_receipt(&self, tx_hash: Hash) -> Result<TxReceipt, ChainError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            match self.transaction_receipt(&tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(
                        "[relay] Receipt poll for 0x{} failed: {}",
                        hex::encode(tx_hash),
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                warn!(
                    "[relay] No receipt for 0x{} after {:?}",
                    hex::encode(tx_hash),
                    self.receipt_timeout
                );
                return Err(ChainError::ReceiptTimeout(tx_hash));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ChainReader for JsonRpcChainClient {
    async fn latest_block(&self) -> Result<BlockInfo, ChainError> {
        let block: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let block =
            block.ok_or_else(|| ChainError::InvalidResponse("latest block is null".to_string()))?;
        Ok(BlockInfo {
            number: parse_quantity(&block.number)?,
            timestamp: parse_quantity(&block.timestamp)?,
        })
    }

    async fn logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>, ChainError> {
        let filter = json!([{
            "address": format!("0x{}", hex::encode(address)),
            "fromBlock": to_quantity(from_block),
            "toBlock": to_quantity(to_block),
        }]);
        let logs: Vec<Value> = self.call("eth_getLogs", filter).await?;

        Ok(logs
            .into_iter()
            .map(RpcLog::from_value)
            .filter(|log| !log.removed)
            .map(RpcLog::into_entry)
            .collect())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        let count: String = self
            .call(
                "eth_getTransactionCount",
                json!([format!("0x{}", hex::encode(address)), "pending"]),
            )
            .await?;
        parse_quantity(&count)
    }
}

#[async_trait]
impl ChainWriter for JsonRpcChainClient {
    async fn send_signed_transaction(&self, raw: &[u8]) -> Result<TxReceipt, ChainError> {
        let encoded = format!("0x{}", hex::encode(raw));
        let tx_hash: String = self.call("eth_sendRawTransaction", [encoded]).await?;
        debug!("[relay] Broadcast {}", tx_hash);
        self.wait_for_receipt(parse_hash_field(&tx_hash)?).await
    }

    async fn transaction_receipt(&self, tx_hash: &Hash) -> Result<Option<TxReceipt>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .call(
                "eth_getTransactionReceipt",
                [format!("0x{}", hex::encode(tx_hash))],
            )
            .await?;
        receipt.map(RpcReceipt::into_receipt).transpose()
    }
}
