//! chainwatch-sink — the delivery contract the engine fans out to, plus the
//! HTTP webhook implementations (generic webhook, Slack, Teams).

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainwatch_core::{NormalizedEvent, WatchError};

pub use http::HttpSender;

/// The data handed to sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub rule_id: String,
    pub chain: String,
    pub source_id: String,
    pub height: u64,
    pub block_hash: String,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u32>,
    pub app_id: u64,
    pub args: Value,
}

impl EventPayload {
    /// Project a normalized event into the sink payload shape.
    pub fn from_event(event: &NormalizedEvent) -> Self {
        Self {
            rule_id: event.rule_id.clone(),
            chain: event.chain.clone(),
            source_id: event.source_id.clone(),
            height: event.height,
            block_hash: event.block_hash.clone(),
            tx_hash: event.tx_hash.clone(),
            log_index: event.log_index,
            app_id: event.app_id,
            args: event.args_json(),
        }
    }
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy)]
pub struct SinkResponse {
    /// HTTP status code returned by the sink endpoint.
    pub status: u16,
}

/// The delivery contract. The engine treats every sink as this interface;
/// transports live behind it.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, payload: &EventPayload) -> Result<SinkResponse, WatchError>;
}
