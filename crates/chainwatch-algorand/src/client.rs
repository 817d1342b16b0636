//! Narrow algod REST surface used by the scanner.

use async_trait::async_trait;
use serde::Deserialize;

use chainwatch_core::WatchError;

/// The subset of algod the scanner needs.
#[async_trait]
pub trait AlgodClient: Send + Sync {
    /// Latest round from `/v2/status`.
    async fn last_round(&self) -> Result<u64, WatchError>;

    /// Raw msgpack block from `/v2/blocks/{round}?format=msgpack`.
    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, WatchError>;

    /// Canonical block hash string from `/v2/blocks/{round}/hash`.
    async fn block_hash(&self, round: u64) -> Result<String, WatchError>;
}

/// algod REST client backed by `reqwest`.
pub struct HttpAlgodClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "last-round")]
    last_round: u64,
}

#[derive(Deserialize)]
struct BlockHashResponse {
    #[serde(rename = "blockHash")]
    block_hash: String,
}

impl HttpAlgodClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, WatchError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| WatchError::Rpc(format!("build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    async fn get(&self, path: &str, accept: &str) -> Result<reqwest::Response, WatchError> {
        let mut req = self
            .http
            .get(format!("{}{path}", self.base_url))
            .header("Accept", accept);
        if let Some(token) = &self.token {
            req = req.header("X-Algo-API-Token", token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| WatchError::Rpc(format!("GET {path}: {e}")))?;
        if !resp.status().is_success() {
            return Err(WatchError::Rpc(format!(
                "GET {path}: HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl AlgodClient for HttpAlgodClient {
    async fn last_round(&self) -> Result<u64, WatchError> {
        let resp = self.get("/v2/status", "application/json").await?;
        let status: StatusResponse = resp
            .json()
            .await
            .map_err(|e| WatchError::Rpc(format!("decode status: {e}")))?;
        Ok(status.last_round)
    }

    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, WatchError> {
        let resp = self
            .get(
                &format!("/v2/blocks/{round}?format=msgpack"),
                "application/msgpack",
            )
            .await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| WatchError::Rpc(format!("read block {round}: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn block_hash(&self, round: u64) -> Result<String, WatchError> {
        let resp = self
            .get(&format!("/v2/blocks/{round}/hash"), "application/json")
            .await?;
        let hash: BlockHashResponse = resp
            .json()
            .await
            .map_err(|e| WatchError::Rpc(format!("decode block hash {round}: {e}")))?;
        Ok(hash.block_hash)
    }
}
