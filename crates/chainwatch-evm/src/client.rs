//! EVM block and log fetching over JSON-RPC.
//!
//! Uses `eth_blockNumber`, `eth_getBlockByNumber`, and `eth_getLogs`. The
//! trait surface is intentionally narrow so fakes can drive the scanner in
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainwatch_core::WatchError;

/// A minimal block header — enough for cursor tracking and parent-hash
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
}

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns the block number as u64.
    pub fn block_number_u64(&self) -> u64 {
        parse_hex_u64(&self.block_number)
    }

    /// Returns the log index as u32.
    pub fn log_index_u32(&self) -> u32 {
        parse_hex_u64(&self.log_index) as u32
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    /// Decode the data payload from hex.
    pub fn data_bytes(&self) -> Result<Vec<u8>, WatchError> {
        alloy_primitives::hex::decode(&self.data)
            .map_err(|e| WatchError::Decode(format!("log data hex: {e}")))
    }
}

/// The subset of an EVM node the scanner needs.
#[async_trait]
pub trait EvmClient: Send + Sync {
    /// Fetch a header by number; `None` means the latest block.
    async fn header_by_number(&self, number: Option<u64>) -> Result<BlockHeader, WatchError>;

    /// Fetch logs in `[from, to]` emitted by any of `addresses`
    /// (empty = all addresses), ordered by `(block_number, log_index)`.
    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[String],
    ) -> Result<Vec<RawLog>, WatchError>;
}

// ─── HTTP implementation ─────────────────────────────────────────────────────

/// JSON-RPC client backed by `reqwest`.
pub struct HttpEvmClient {
    url: String,
    http: reqwest::Client,
}

impl HttpEvmClient {
    pub fn new(url: impl Into<String>) -> Result<Self, WatchError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| WatchError::Rpc(format!("build http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, WatchError> {
        let req = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| WatchError::Rpc(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            return Err(WatchError::Rpc(format!(
                "{method}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let envelope: Value = resp
            .json()
            .await
            .map_err(|e| WatchError::Rpc(format!("{method}: decode response: {e}")))?;

        if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
            return Err(WatchError::Rpc(format!("{method}: rpc error: {err}")));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl EvmClient for HttpEvmClient {
    async fn header_by_number(&self, number: Option<u64>) -> Result<BlockHeader, WatchError> {
        let tag = match number {
            Some(n) => format!("0x{n:x}"),
            None => "latest".to_string(),
        };
        let result = self
            .rpc("eth_getBlockByNumber", json!([tag, false]))
            .await?;
        header_from_json(&result)
            .ok_or_else(|| WatchError::Rpc(format!("block {tag} missing or malformed")))
    }

    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[String],
    ) -> Result<Vec<RawLog>, WatchError> {
        let mut filter = json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        });
        if !addresses.is_empty() {
            filter["address"] = json!(addresses);
        }
        let result = self.rpc("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(result)
            .map_err(|e| WatchError::Rpc(format!("eth_getLogs: decode logs: {e}")))
    }
}

/// Parse a hex-encoded string (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}

/// Convert a JSON block response to a `BlockHeader`.
pub fn header_from_json(v: &Value) -> Option<BlockHeader> {
    Some(BlockHeader {
        number: parse_hex_u64(v["number"].as_str()?),
        hash: v["hash"].as_str()?.to_string(),
        parent_hash: v["parentHash"].as_str()?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1"), 1);
        assert_eq!(parse_hex_u64("0xff"), 255);
        assert_eq!(parse_hex_u64("1234"), 0x1234);
    }

    #[test]
    fn raw_log_accessors() {
        let log = RawLog {
            address: "0x0".into(),
            topics: vec![],
            data: "0x".into(),
            block_number: "0x12a05f200".into(),
            block_hash: "0x0".into(),
            tx_hash: "0x0".into(),
            log_index: "0x5".into(),
            removed: None,
        };
        assert_eq!(log.block_number_u64(), 5_000_000_000);
        assert_eq!(log.log_index_u32(), 5);
        assert!(!log.is_removed());
    }

    #[test]
    fn header_from_json_roundtrip() {
        let v = serde_json::json!({
            "number": "0x10",
            "hash": "0xaaa",
            "parentHash": "0xbbb",
            "timestamp": "0x0",
        });
        let h = header_from_json(&v).unwrap();
        assert_eq!(h.number, 16);
        assert_eq!(h.hash, "0xaaa");
        assert_eq!(h.parent_hash, "0xbbb");
    }

    #[test]
    fn header_from_json_rejects_null_block() {
        assert!(header_from_json(&Value::Null).is_none());
    }
}
