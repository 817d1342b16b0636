//! HTTP webhook sender.
//!
//! All three configured sink types (slack, teams, webhook) post a JSON
//! `{"text": rendered}` body; they differ only in URL, method, and default
//! headers. Message templates use `{{field}}` placeholders over the payload
//! fields (`rule_id`, `chain`, `source_id`, `height`, `block_hash`,
//! `tx_hash`, `log_index`, `app_id`, `args`).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use chainwatch_core::WatchError;

use crate::{EventPayload, Sender, SinkResponse};

const DEFAULT_TEMPLATE: &str = "ALERT {{rule_id}} {{chain}} {{tx_hash}}";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Generic HTTP sink.
pub struct HttpSender {
    sink_id: String,
    url: String,
    method: reqwest::Method,
    template: String,
    headers: HashMap<String, String>,
    http: reqwest::Client,
}

impl HttpSender {
    /// Build a generic webhook sink.
    pub fn webhook(
        sink_id: impl Into<String>,
        url: impl Into<String>,
        method: &str,
        template: &str,
    ) -> Result<Self, WatchError> {
        let url = url.into();
        if url.is_empty() {
            return Err(WatchError::Config("webhook url required".into()));
        }
        let method = if method.is_empty() { "POST" } else { method };
        let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| WatchError::Config(format!("invalid sink method {method:?}")))?;

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| WatchError::Config(format!("build sink client: {e}")))?;

        Ok(Self {
            sink_id: sink_id.into(),
            url,
            method,
            template: if template.is_empty() {
                DEFAULT_TEMPLATE.to_string()
            } else {
                template.to_string()
            },
            headers: HashMap::new(),
            http,
        })
    }

    /// Slack-compatible webhook sink.
    pub fn slack(
        sink_id: impl Into<String>,
        webhook_url: impl Into<String>,
        template: &str,
    ) -> Result<Self, WatchError> {
        let mut sender = Self::webhook(sink_id, webhook_url, "POST", template)?;
        sender
            .headers
            .insert("Content-Type".into(), "application/json".into());
        Ok(sender)
    }

    /// Teams-compatible webhook sink. Teams accepts the same simple
    /// `{"text": ...}` body.
    pub fn teams(
        sink_id: impl Into<String>,
        webhook_url: impl Into<String>,
        template: &str,
    ) -> Result<Self, WatchError> {
        Self::slack(sink_id, webhook_url, template)
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(&self, payload: &EventPayload) -> Result<SinkResponse, WatchError> {
        let text = render_template(&self.template, payload);
        let body = serde_json::json!({ "text": text });

        let mut req = self
            .http
            .request(self.method.clone(), &self.url)
            .json(&body);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        let resp = req.send().await.map_err(|e| WatchError::Sink {
            sink_id: self.sink_id.clone(),
            status: None,
            reason: e.to_string(),
        })?;

        let status = resp.status().as_u16();
        if status >= 300 {
            return Err(WatchError::Sink {
                sink_id: self.sink_id.clone(),
                status: Some(status),
                reason: format!("sink http status {status}"),
            });
        }

        debug!(sink_id = %self.sink_id, status, "alert delivered");
        Ok(SinkResponse { status })
    }
}

/// Substitute `{{field}}` placeholders with payload values. Unknown
/// placeholders are left as-is.
pub fn render_template(template: &str, payload: &EventPayload) -> String {
    let log_index = payload
        .log_index
        .map(|i| i.to_string())
        .unwrap_or_default();
    let substitutions = [
        ("{{rule_id}}", payload.rule_id.as_str()),
        ("{{chain}}", payload.chain.as_str()),
        ("{{source_id}}", payload.source_id.as_str()),
        ("{{block_hash}}", payload.block_hash.as_str()),
        ("{{tx_hash}}", payload.tx_hash.as_str()),
        ("{{log_index}}", log_index.as_str()),
    ];

    let mut out = template.to_string();
    for (token, value) in substitutions {
        out = out.replace(token, value);
    }
    out = out.replace("{{height}}", &payload.height.to_string());
    out = out.replace("{{app_id}}", &payload.app_id.to_string());
    if out.contains("{{args}}") {
        out = out.replace("{{args}}", &payload.args.to_string());
    }
    out
}

// ─── Tests ───────────────────────────────────────────────────────────────────
