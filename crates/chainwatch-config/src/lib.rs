//! chainwatch-config — YAML configuration with `${VAR}` environment
//! interpolation and upfront validation.
//!
//! The shapes here mirror the on-disk schema; [`Config::rule_specs`]
//! converts rules into the engine-facing [`RuleSpec`] form.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use chainwatch_core::{DedupeSpec, MatchSpec, RateLimitSpec, RuleSpec, WatchError};

/// The full YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub db_path: String,
    /// Confirmation counts per chain family (`evm`, `algorand`).
    #[serde(default)]
    pub confirmations: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,

    // EVM
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub start_block: String,
    #[serde(default)]
    pub abi_dirs: Vec<String>,

    // Algorand
    #[serde(default)]
    pub algod_url: String,
    #[serde(default)]
    pub algod_token: String,
    #[serde(default)]
    pub indexer_url: String,
    #[serde(default)]
    pub start_round: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub contract: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub app_id: u64,
    #[serde(rename = "where", default)]
    pub predicates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    pub key: String,
    pub ttl: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    pub source: String,
    #[serde(rename = "match")]
    pub match_spec: MatchConfig,
    #[serde(default)]
    pub sinks: Vec<String>,
    #[serde(default)]
    pub dedupe: Option<DedupeConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
}

/// Read, interpolate env vars, parse YAML, and validate.
pub fn load(path: &str) -> Result<Config, WatchError> {
    if path.is_empty() {
        return Err(WatchError::Config("config path is required".into()));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| WatchError::Config(format!("read config {path}: {e}")))?;
    parse(&raw)
}

/// Parse an in-memory YAML document (exposed for tests and tooling).
pub fn parse(raw: &str) -> Result<Config, WatchError> {
    let interpolated = interpolate_env(raw)?;
    let cfg: Config = serde_yaml::from_str(&interpolated)
        .map_err(|e| WatchError::Config(format!("parse config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"))
}

/// Substitute `${VAR}` occurrences from the environment. All referenced
/// variables must be present; missing ones are reported together.
pub fn interpolate_env(input: &str) -> Result<String, WatchError> {
    let mut missing: Vec<String> = Vec::new();
    let out = env_pattern().replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(val) => val,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(WatchError::Config(format!(
            "missing environment variables: {}",
            missing.join(", ")
        )));
    }
    Ok(out.into_owned())
}

impl Config {
    /// Confirmation count for a chain family (0 when unset).
    pub fn confirmations(&self, chain: &str) -> u64 {
        self.global.confirmations.get(chain).copied().unwrap_or(0)
    }

    /// Convert rules into engine-facing specs.
    pub fn rule_specs(&self) -> Result<Vec<RuleSpec>, WatchError> {
        self.rules.iter().map(RuleConfig::to_spec).collect()
    }

    /// Schema checks: unique ids, cross-references, per-type requirements.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.version == 0 {
            return Err(WatchError::Config("version is required".into()));
        }
        if self.sources.is_empty() {
            return Err(WatchError::Config("at least one source is required".into()));
        }
        if self.sinks.is_empty() {
            return Err(WatchError::Config("at least one sink is required".into()));
        }
        if self.rules.is_empty() {
            return Err(WatchError::Config("at least one rule is required".into()));
        }

        let mut source_ids = Vec::new();
        for source in &self.sources {
            if source_ids.contains(&source.id) {
                return Err(WatchError::Config(format!(
                    "duplicate source id: {}",
                    source.id
                )));
            }
            source_ids.push(source.id.clone());
            source.validate()?;
        }

        let mut sink_ids = Vec::new();
        for sink in &self.sinks {
            if sink_ids.contains(&sink.id) {
                return Err(WatchError::Config(format!("duplicate sink id: {}", sink.id)));
            }
            sink_ids.push(sink.id.clone());
            sink.validate()?;
        }

        for rule in &self.rules {
            rule.validate(&source_ids, &sink_ids)?;
        }

        Ok(())
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<(), WatchError> {
        if self.id.is_empty() {
            return Err(WatchError::Config("source id is required".into()));
        }
        match self.kind.to_ascii_lowercase().as_str() {
            "evm" => {
                if self.rpc_url.is_empty() {
                    return Err(WatchError::Config(format!(
                        "source {}: rpc_url is required for evm sources",
                        self.id
                    )));
                }
            }
            "algorand" => {
                if self.algod_url.is_empty() || self.indexer_url.is_empty() {
                    return Err(WatchError::Config(format!(
                        "source {}: algod_url and indexer_url are required for algorand sources",
                        self.id
                    )));
                }
            }
            other => {
                return Err(WatchError::Config(format!(
                    "source {}: unsupported type {other:?}",
                    self.id
                )))
            }
        }
        Ok(())
    }
}

impl RuleConfig {
    fn validate(&self, source_ids: &[String], sink_ids: &[String]) -> Result<(), WatchError> {
        if self.id.is_empty() {
            return Err(WatchError::Config("rule id is required".into()));
        }
        if self.source.is_empty() {
            return Err(WatchError::Config(format!(
                "rule {}: source is required",
                self.id
            )));
        }
        if !source_ids.contains(&self.source) {
            return Err(WatchError::Config(format!(
                "rule {}: unknown source {}",
                self.id, self.source
            )));
        }
        if self.sinks.is_empty() {
            return Err(WatchError::Config(format!(
                "rule {}: at least one sink is required",
                self.id
            )));
        }
        for sink in &self.sinks {
            if !sink_ids.contains(sink) {
                return Err(WatchError::Config(format!(
                    "rule {}: unknown sink {sink}",
                    self.id
                )));
            }
        }

        match self.match_spec.kind.to_ascii_lowercase().as_str() {
            "log" => {
                if self.match_spec.contract.is_empty() {
                    return Err(WatchError::Config(format!(
                        "rule {}: match.contract is required for log match",
                        self.id
                    )));
                }
                if self.match_spec.event.is_empty() {
                    return Err(WatchError::Config(format!(
                        "rule {}: match.event is required for log match",
                        self.id
                    )));
                }
            }
            "app_call" => {
                if self.match_spec.app_id == 0 {
                    return Err(WatchError::Config(format!(
                        "rule {}: match.app_id is required for app_call match",
                        self.id
                    )));
                }
            }
            "asset_transfer" => {}
            other => {
                return Err(WatchError::Config(format!(
                    "rule {}: unsupported match.type {other:?}",
                    self.id
                )))
            }
        }

        if let Some(dedupe) = &self.dedupe {
            if dedupe.key.is_empty() || dedupe.ttl.is_empty() {
                return Err(WatchError::Config(format!(
                    "rule {}: dedupe.key and dedupe.ttl are required when dedupe is set",
                    self.id
                )));
            }
        }

        Ok(())
    }

    /// Convert to the engine-facing rule shape.
    pub fn to_spec(&self) -> Result<RuleSpec, WatchError> {
        let match_spec = match self.match_spec.kind.to_ascii_lowercase().as_str() {
            "log" => MatchSpec::Log {
                contract: self.match_spec.contract.clone(),
                event: self.match_spec.event.clone(),
            },
            "app_call" => MatchSpec::AppCall {
                app_id: self.match_spec.app_id,
            },
            "asset_transfer" => MatchSpec::AssetTransfer,
            other => {
                return Err(WatchError::Config(format!(
                    "rule {}: unsupported match.type {other:?}",
                    self.id
                )))
            }
        };

        Ok(RuleSpec {
            id: self.id.clone(),
            source: self.source.clone(),
            match_spec,
            predicates: self.match_spec.predicates.clone(),
            sinks: self.sinks.clone(),
            dedupe: self.dedupe.as_ref().map(|d| DedupeSpec {
                key: d.key.clone(),
                ttl: d.ttl.clone(),
            }),
            rate_limit: self.rate_limit.map(|rl| RateLimitSpec {
                capacity: rl.capacity,
                rate: rl.rate,
            }),
        })
    }
}

impl SinkConfig {
    fn validate(&self) -> Result<(), WatchError> {
        if self.id.is_empty() {
            return Err(WatchError::Config("sink id is required".into()));
        }
        match self.kind.to_ascii_lowercase().as_str() {
            "slack" | "teams" => {
                if self.webhook_url.is_empty() {
                    return Err(WatchError::Config(format!(
                        "sink {}: webhook_url is required for slack/teams sinks",
                        self.id
                    )));
                }
            }
            "webhook" => {
                if self.url.is_empty() {
                    return Err(WatchError::Config(format!(
                        "sink {}: url is required for webhook sinks",
                        self.id
                    )));
                }
            }
            other => {
                return Err(WatchError::Config(format!(
                    "sink {}: unsupported type {other:?}",
                    self.id
                )))
            }
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: 1
global:
  db_path: ./watch.db
  confirmations:
    evm: 12
    algorand: 2
sources:
  - id: evm_main
    type: evm
    rpc_url: http://localhost:8545
    start_block: "latest-100"
  - id: algo_main
    type: algorand
    algod_url: http://localhost:4001
    indexer_url: http://localhost:8980
    start_round: "0"
rules:
  - id: usdc-whale
    source: evm_main
    match:
      type: log
      contract: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
      event: "Transfer(address,address,uint256)"
      where:
        - "value >= 1_000_000 * 1e6"
    sinks: [ops-slack]
    dedupe:
      key: txhash
      ttl: 1h
    rate_limit:
      capacity: 5
      rate: 0.5
  - id: app-activity
    source: algo_main
    match:
      type: app_call
      app_id: 123
    sinks: [ops-slack]
sinks:
  - id: ops-slack
    type: slack
    webhook_url: https://hooks.slack.com/services/T000/B000/XXX
"#;

    #[test]
    fn parses_and_validates_sample() {
        let cfg = parse(SAMPLE).unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.confirmations("evm"), 12);
        assert_eq!(cfg.confirmations("algorand"), 2);
        assert_eq!(cfg.confirmations("unknown"), 0);
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.rules[0].match_spec.predicates.len(), 1);
    }

    #[test]
    fn converts_rules_to_specs() {
        let cfg = parse(SAMPLE).unwrap();
        let specs = cfg.rule_specs().unwrap();
        assert_eq!(specs.len(), 2);

        let whale = &specs[0];
        assert!(matches!(whale.match_spec, MatchSpec::Log { .. }));
        assert_eq!(whale.predicates, vec!["value >= 1_000_000 * 1e6"]);
        assert_eq!(whale.dedupe.as_ref().unwrap().ttl, "1h");
        assert_eq!(whale.rate_limit.unwrap().capacity, 5.0);

        assert!(matches!(
            specs[1].match_spec,
            MatchSpec::AppCall { app_id: 123 }
        ));
    }

    #[test]
    fn interpolates_environment_variables() {
        std::env::set_var("CHAINWATCH_TEST_URL", "http://example:8545");
        let out = interpolate_env("rpc_url: ${CHAINWATCH_TEST_URL}").unwrap();
        assert_eq!(out, "rpc_url: http://example:8545");
    }

    #[test]
    fn missing_environment_variables_reported_once() {
        let err =
            interpolate_env("a: ${CHAINWATCH_MISSING_X}\nb: ${CHAINWATCH_MISSING_X}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("CHAINWATCH_MISSING_X"));
        assert_eq!(msg.matches("CHAINWATCH_MISSING_X").count(), 1);
    }

    #[test]
    fn duplicate_source_id_rejected() {
        let cfg = SAMPLE.replace("id: algo_main", "id: evm_main");
        let err = parse(&cfg).unwrap_err();
        assert!(err.to_string().contains("duplicate source id"));
    }

    #[test]
    fn unknown_sink_reference_rejected() {
        let cfg = SAMPLE.replace("sinks: [ops-slack]\n    dedupe:", "sinks: [nope]\n    dedupe:");
        let err = parse(&cfg).unwrap_err();
        assert!(err.to_string().contains("unknown sink"));
    }

    #[test]
    fn evm_source_requires_rpc_url() {
        let cfg = SAMPLE.replace("rpc_url: http://localhost:8545", "rpc_url: \"\"");
        assert!(parse(&cfg).is_err());
    }

    #[test]
    fn log_rule_requires_event() {
        let cfg = SAMPLE.replace(r#"event: "Transfer(address,address,uint256)""#, r#"event: """#);
        assert!(parse(&cfg).is_err());
    }
}
