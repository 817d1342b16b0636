//! The chain-agnostic event representation passed from scanners to sinks.

use std::collections::BTreeMap;
use std::fmt;

use alloy_primitives::{hex, I256, U256};
use serde::{Deserialize, Serialize};

// ─── Value ───────────────────────────────────────────────────────────────────

/// A decoded event argument.
///
/// Chains disagree on primitive types; scanners normalize everything into
/// this one enum so predicates and sinks never see chain-specific values.
/// Integers keep full 256-bit precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Uint(U256),
    Int(I256),
    Bool(bool),
    /// 0x-prefixed hex (EVM) or base32 with checksum (Algorand).
    Address(String),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Exact unsigned-integer view, when the value is a non-negative integer
    /// (or a decimal-digit string).
    pub fn as_u256(&self) -> Option<U256> {
        match self {
            Value::Uint(u) => Some(*u),
            Value::Int(i) if !i.is_negative() => Some(i.into_raw()),
            Value::Str(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                U256::from_str_radix(s, 10).ok()
            }
            _ => None,
        }
    }

    /// Approximate numeric view for float comparisons. Magnitudes beyond
    /// 2^53 should go through [`Value::as_u256`] instead.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Uint(u) => u.to_string().parse().ok(),
            Value::Int(i) => i.to_string().parse().ok(),
            Value::Str(s) => s.trim().replace('_', "").parse().ok(),
            _ => None,
        }
    }

    /// Canonical JSON projection: integers beyond the native JSON range are
    /// rendered as decimal strings so precision survives the sink boundary.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Uint(u) => match u64::try_from(*u) {
                Ok(small) => serde_json::Value::from(small),
                Err(_) => serde_json::Value::from(u.to_string()),
            },
            Value::Int(i) => match i64::try_from(*i) {
                Ok(small) => serde_json::Value::from(small),
                Err(_) => serde_json::Value::from(i.to_string()),
            },
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Address(a) => serde_json::Value::from(a.clone()),
            Value::Bytes(b) => serde_json::Value::from(format!("0x{}", hex::encode(b))),
            Value::Str(s) => serde_json::Value::from(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    /// Canonical formatter used by `in` / `contains` and string comparisons.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(u) => write!(f, "{u}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Address(a) => write!(f, "{a}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(","))
            }
            Value::Map(entries) => {
                let rendered: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                write!(f, "{{{}}}", rendered.join(","))
            }
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(U256::from(v))
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Value::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ─── NormalizedEvent ─────────────────────────────────────────────────────────

/// Decoded event argument map, keyed by parameter name.
pub type Args = BTreeMap<String, Value>;

/// A decoded on-chain event in a uniform shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Rule that matched this event.
    pub rule_id: String,
    /// Chain family slug (`"evm"` / `"algorand"`).
    pub chain: String,
    /// Source the event was scanned from.
    pub source_id: String,
    /// Block height / round.
    pub height: u64,
    /// Canonical hash of the containing block.
    pub block_hash: String,
    /// Transaction hash / id.
    pub tx_hash: String,
    /// Log position within the transaction (EVM only).
    pub log_index: Option<u32>,
    /// Emitting contract address (EVM only).
    pub contract: Option<String>,
    /// Application id (Algorand app calls; 0 otherwise).
    pub app_id: u64,
    /// Event / match name (e.g. `"Transfer"`, `"app_call"`).
    pub name: String,
    /// Decoded event parameters by name.
    pub args: Args,
}

impl NormalizedEvent {
    /// Canonical JSON of the args map, used for alert payload rows.
    pub fn args_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.args
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
