//! Per-rule log filtering and decoding.
//!
//! A matcher accepts a log iff `log.address == rule.contract` and
//! `log.topics[0] == keccak256(rule.event_signature)`. Indexed parameters
//! decode from `topics[1..]`; non-indexed parameters decode from `data` as
//! an ABI tuple.
//!
//! # Indexed-parameter encoding rules
//! Value types (uint, int, bool, address, bytes1–bytes32) are stored
//! directly in the topic and can be recovered. Reference types (string,
//! bytes, arrays, tuples) are stored as the keccak256 of their encoding;
//! the original value is unrecoverable, so the raw 32-byte hash is kept as
//! `Bytes`.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{hex, keccak256};

use chainwatch_core::event::Args;
use chainwatch_core::{MatchSpec, NormalizedEvent, RuleSpec, Value, WatchError};

use crate::abi::AbiCatalog;
use crate::client::RawLog;

/// One decoded event parameter slot.
#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    ty: DynSolType,
    indexed: bool,
}

/// Filters and decodes logs for a single rule.
pub struct RuleMatcher {
    rule_id: String,
    contract: String,
    topic0: String,
    name: String,
    /// `None` when the signature's types could not be resolved; matching
    /// still proceeds on address + topic0 with empty args.
    params: Option<Vec<ParamSpec>>,
}

impl RuleMatcher {
    /// Build a matcher for a log rule, preferring the ABI catalog for
    /// parameter names and indexed flags and falling back to a synthetic
    /// all-non-indexed event derived from the signature.
    pub fn new(rule: &RuleSpec, catalog: &AbiCatalog) -> Result<Self, WatchError> {
        let MatchSpec::Log { contract, event } = &rule.match_spec else {
            return Err(WatchError::Config(format!(
                "rule {}: only log rules are supported on evm sources",
                rule.id
            )));
        };
        if contract.is_empty() || event.is_empty() {
            return Err(WatchError::Config(format!(
                "rule {}: contract and event are required",
                rule.id
            )));
        }

        let name = event_name(event).to_string();
        let topic0 = format!("0x{}", hex::encode(keccak256(event.as_bytes())));

        let params = match catalog.get(&name) {
            Some(abi_event) => params_from_abi(abi_event),
            None => synthetic_params(event),
        };

        Ok(Self {
            rule_id: rule.id.clone(),
            contract: contract.to_ascii_lowercase(),
            topic0,
            name,
            params,
        })
    }

    /// The contract address this matcher filters on (lowercase hex).
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Check the log against the matcher; decode args on a match.
    pub fn match_log(&self, log: &RawLog) -> Result<Option<NormalizedEvent>, WatchError> {
        if !log.address.eq_ignore_ascii_case(&self.contract) {
            return Ok(None);
        }
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        if !topic0.eq_ignore_ascii_case(&self.topic0) {
            return Ok(None);
        }

        let args = match &self.params {
            Some(params) => self.decode_args(params, log)?,
            None => Args::new(),
        };

        Ok(Some(NormalizedEvent {
            rule_id: self.rule_id.clone(),
            chain: String::new(),     // stamped by the scanner
            source_id: String::new(), // stamped by the scanner
            height: 0,
            block_hash: String::new(),
            tx_hash: log.tx_hash.clone(),
            log_index: Some(log.log_index_u32()),
            contract: Some(log.address.clone()),
            app_id: 0,
            name: self.name.clone(),
            args,
        }))
    }

    fn decode_args(&self, params: &[ParamSpec], log: &RawLog) -> Result<Args, WatchError> {
        let mut args = Args::new();

        // Indexed parameters map 1:1 onto topics[1..].
        let mut topic_iter = log.topics.iter().skip(1);
        for param in params.iter().filter(|p| p.indexed) {
            let topic = topic_iter.next().ok_or_else(|| {
                WatchError::Decode(format!(
                    "rule {}: log is missing a topic for indexed param {}",
                    self.rule_id, param.name
                ))
            })?;
            args.insert(param.name.clone(), decode_topic(topic, &param.ty)?);
        }

        // Non-indexed parameters are one ABI tuple in the data payload.
        let data_params: Vec<&ParamSpec> = params.iter().filter(|p| !p.indexed).collect();
        if !data_params.is_empty() {
            let tuple = DynSolType::Tuple(data_params.iter().map(|p| p.ty.clone()).collect());
            let decoded = tuple
                .abi_decode(&log.data_bytes()?)
                .map_err(|e| WatchError::Decode(format!("rule {}: unpack data: {e}", self.rule_id)))?;
            let values = match decoded {
                DynSolValue::Tuple(vals) => vals,
                other => vec![other],
            };
            for (param, val) in data_params.iter().zip(values) {
                args.insert(param.name.clone(), normalize(val));
            }
        }

        Ok(args)
    }
}

/// Decode a single indexed topic (always 32 bytes).
fn decode_topic(topic_hex: &str, ty: &DynSolType) -> Result<Value, WatchError> {
    let bytes = hex::decode(topic_hex)
        .map_err(|e| WatchError::Decode(format!("invalid topic hex: {e}")))?;

    // Reference types are hashed in indexed position; keep the raw hash.
    if matches!(
        ty,
        DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(..)
            | DynSolType::Tuple(_)
    ) {
        return Ok(Value::Bytes(bytes));
    }

    let val = ty
        .abi_decode(&bytes)
        .map_err(|e| WatchError::Decode(format!("topic decode: {e}")))?;
    Ok(normalize(val))
}

/// Normalize an alloy value into the pipeline value model.
fn normalize(v: DynSolValue) -> Value {
    match v {
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::Uint(u, _) => Value::Uint(u),
        DynSolValue::Int(i, _) => Value::Int(i),
        DynSolValue::Address(a) => Value::Address(a.to_checksum(None)),
        DynSolValue::FixedBytes(word, n) => Value::Bytes(word.as_slice()[..n].to_vec()),
        DynSolValue::Bytes(b) => Value::Bytes(b),
        DynSolValue::String(s) => Value::Str(s),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            Value::List(items.into_iter().map(normalize).collect())
        }
        DynSolValue::Tuple(items) => Value::List(items.into_iter().map(normalize).collect()),
        other => Value::Str(format!("{other:?}")),
    }
}

/// `Transfer(address,address,uint256)` → `Transfer`.
fn event_name(signature: &str) -> &str {
    match signature.find('(') {
        Some(i) if i > 0 => &signature[..i],
        _ => signature,
    }
}

fn params_from_abi(event: &alloy_core::json_abi::Event) -> Option<Vec<ParamSpec>> {
    event
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let ty = DynSolType::parse(&input.ty).ok()?;
            let name = if input.name.is_empty() {
                format!("arg{i}")
            } else {
                input.name.clone()
            };
            Some(ParamSpec {
                name,
                ty,
                indexed: input.indexed,
            })
        })
        .collect()
}

/// Build parameter slots from a bare signature. Indexed flags cannot be
/// inferred, so every argument is treated as non-indexed with a positional
/// name.
fn synthetic_params(signature: &str) -> Option<Vec<ParamSpec>> {
    let l = signature.find('(')?;
    let r = signature.rfind(')')?;
    if l == 0 || r <= l {
        return None;
    }
    signature[l + 1..r]
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .enumerate()
        .map(|(i, raw)| {
            let ty = DynSolType::parse(raw).ok()?;
            Some(ParamSpec {
                name: format!("arg{i}"),
                ty,
                indexed: false,
            })
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::json_abi::{Event, EventParam};
    use alloy_primitives::U256;
    use chainwatch_core::MatchSpec;

    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const TRANSFER_SIG: &str = "Transfer(address,address,uint256)";

    fn rule() -> RuleSpec {
        RuleSpec {
            id: "r1".into(),
            source: "evm_main".into(),
            match_spec: MatchSpec::Log {
                contract: USDC.into(),
                event: TRANSFER_SIG.into(),
            },
            predicates: vec![],
            sinks: vec![],
            dedupe: None,
            rate_limit: None,
        }
    }

    fn topic0() -> String {
        format!("0x{}", hex::encode(keccak256(TRANSFER_SIG.as_bytes())))
    }

    fn address_word(addr_byte: u8) -> [u8; 32] {
        let mut w = [0u8; 32];
        for b in &mut w[12..] {
            *b = addr_byte;
        }
        w
    }

    fn uint_word(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn transfer_log(topics: Vec<String>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: USDC.to_ascii_lowercase(),
            topics,
            data: format!("0x{}", hex::encode(data)),
            block_number: "0x1".into(),
            block_hash: "0xblock".into(),
            tx_hash: "0xtx".into(),
            log_index: "0x0".into(),
            removed: None,
        }
    }

    #[test]
    fn synthetic_event_decodes_positionally() {
        let m = RuleMatcher::new(&rule(), &AbiCatalog::new()).unwrap();

        // All args non-indexed: data = (from, to, value).
        let mut data = Vec::new();
        data.extend_from_slice(&address_word(0x11));
        data.extend_from_slice(&address_word(0x22));
        data.extend_from_slice(&uint_word(1000));

        let ev = m
            .match_log(&transfer_log(vec![topic0()], data))
            .unwrap()
            .expect("match");
        assert_eq!(ev.name, "Transfer");
        assert_eq!(ev.log_index, Some(0));
        assert_eq!(ev.args["arg2"], Value::Uint(U256::from(1000u64)));
        assert!(matches!(ev.args["arg0"], Value::Address(_)));
    }

    #[test]
    fn abi_event_decodes_indexed_topics_by_name() {
        let mut catalog = AbiCatalog::new();
        catalog.insert(
            "Transfer".into(),
            Event {
                name: "Transfer".into(),
                inputs: vec![
                    EventParam {
                        ty: "address".into(),
                        name: "from".into(),
                        indexed: true,
                        components: vec![],
                        internal_type: None,
                    },
                    EventParam {
                        ty: "address".into(),
                        name: "to".into(),
                        indexed: true,
                        components: vec![],
                        internal_type: None,
                    },
                    EventParam {
                        ty: "uint256".into(),
                        name: "value".into(),
                        indexed: false,
                        components: vec![],
                        internal_type: None,
                    },
                ],
                anonymous: false,
            },
        );
        let m = RuleMatcher::new(&rule(), &catalog).unwrap();

        let topics = vec![
            topic0(),
            format!("0x{}", hex::encode(address_word(0x11))),
            format!("0x{}", hex::encode(address_word(0x22))),
        ];
        let ev = m
            .match_log(&transfer_log(topics, uint_word(1000).to_vec()))
            .unwrap()
            .expect("match");

        assert_eq!(ev.args["value"], Value::Uint(U256::from(1000u64)));
        let Value::Address(from) = &ev.args["from"] else {
            panic!("from should be an address");
        };
        assert!(from.eq_ignore_ascii_case("0x1111111111111111111111111111111111111111"));
    }

    #[test]
    fn wrong_address_is_no_match() {
        let m = RuleMatcher::new(&rule(), &AbiCatalog::new()).unwrap();
        let mut log = transfer_log(vec![topic0()], uint_word(1).to_vec());
        log.address = "0x1111111111111111111111111111111111111111".into();
        assert!(m.match_log(&log).unwrap().is_none());
    }

    #[test]
    fn wrong_topic0_is_no_match() {
        let m = RuleMatcher::new(&rule(), &AbiCatalog::new()).unwrap();
        let other = format!(
            "0x{}",
            hex::encode(keccak256("Approval(address,address,uint256)".as_bytes()))
        );
        let mut data = Vec::new();
        data.extend_from_slice(&address_word(0x11));
        data.extend_from_slice(&address_word(0x22));
        data.extend_from_slice(&uint_word(1));
        let log = transfer_log(vec![other], data);
        assert!(m.match_log(&log).unwrap().is_none());
    }

    #[test]
    fn empty_topics_is_no_match() {
        let m = RuleMatcher::new(&rule(), &AbiCatalog::new()).unwrap();
        let log = transfer_log(vec![], vec![]);
        assert!(m.match_log(&log).unwrap().is_none());
    }

    #[test]
    fn address_matching_is_case_insensitive() {
        let m = RuleMatcher::new(&rule(), &AbiCatalog::new()).unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&address_word(0x11));
        data.extend_from_slice(&address_word(0x22));
        data.extend_from_slice(&uint_word(7));
        let mut log = transfer_log(vec![topic0()], data);
        log.address = USDC.to_ascii_uppercase().replace("0X", "0x");
        assert!(m.match_log(&log).unwrap().is_some());
    }

    #[test]
    fn non_log_rule_is_rejected() {
        let mut r = rule();
        r.match_spec = MatchSpec::AppCall { app_id: 1 };
        assert!(RuleMatcher::new(&r, &AbiCatalog::new()).is_err());
    }
}
