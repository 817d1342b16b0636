//! Rule specifications consumed by the scanners and the engine.
//!
//! These are the engine-facing shapes; the YAML layer in `chainwatch-config`
//! converts its schema into these before anything is compiled.

use serde::{Deserialize, Serialize};

/// A declarative matching rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Unique rule id.
    pub id: String,
    /// Source this rule listens on.
    pub source: String,
    /// What to match on that source.
    pub match_spec: MatchSpec,
    /// `where` predicate expressions, ANDed together.
    #[serde(default)]
    pub predicates: Vec<String>,
    /// Sink ids to fan out to.
    #[serde(default)]
    pub sinks: Vec<String>,
    /// Optional duplicate suppression.
    #[serde(default)]
    pub dedupe: Option<DedupeSpec>,
    /// Optional per-rule rate limiting.
    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
}

/// What a rule matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchSpec {
    /// EVM log: contract address + canonical event signature
    /// (`Name(type,type,...)`; its Keccak-256 is topic-0).
    Log { contract: String, event: String },
    /// Algorand application call by app id.
    AppCall { app_id: u64 },
    /// Algorand asset transfer (any asset).
    AssetTransfer,
}

/// Duplicate suppression window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeSpec {
    /// Key pattern; `txhash`, `logIndex`, and `app_id` tokens are substituted.
    pub key: String,
    /// Window duration (`"24h"`, `"15m"`, `"1h30m"`). Unparseable falls back to 24h.
    pub ttl: String,
}

/// Token-bucket parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Maximum tokens in the bucket.
    pub capacity: f64,
    /// Refill rate in tokens per second.
    pub rate: f64,
}
