//! Per-rule Algorand transaction matching.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use chainwatch_core::event::Args;
use chainwatch_core::{MatchSpec, NormalizedEvent, RuleSpec, Value, WatchError};

use crate::block::{
    encode_address, SignedTxnInBlock, TX_TYPE_APP_CALL, TX_TYPE_ASSET_TRANSFER,
};

#[derive(Debug, Clone)]
enum MatchKind {
    AppCall { app_id: u64 },
    AssetTransfer,
}

/// Filters transactions in a block's payset for a single rule.
pub struct RuleMatcher {
    rule_id: String,
    kind: MatchKind,
}

impl RuleMatcher {
    pub fn new(rule: &RuleSpec) -> Result<Self, WatchError> {
        let kind = match &rule.match_spec {
            MatchSpec::AppCall { app_id } => {
                if *app_id == 0 {
                    return Err(WatchError::Config(format!(
                        "rule {}: app_id is required for app_call",
                        rule.id
                    )));
                }
                MatchKind::AppCall { app_id: *app_id }
            }
            MatchSpec::AssetTransfer => MatchKind::AssetTransfer,
            MatchSpec::Log { .. } => {
                return Err(WatchError::Config(format!(
                    "rule {}: log rules are not supported on algorand sources",
                    rule.id
                )))
            }
        };
        Ok(Self {
            rule_id: rule.id.clone(),
            kind,
        })
    }

    /// Inspect a payset entry; returns a normalized event on a match.
    /// Height, hashes, and the transaction id are stamped by the scanner.
    pub fn match_txn(&self, stib: &SignedTxnInBlock) -> Option<NormalizedEvent> {
        let tx = &stib.txn;
        match &self.kind {
            MatchKind::AppCall { app_id } => {
                if tx.tx_type != TX_TYPE_APP_CALL || tx.application_id != *app_id {
                    return None;
                }
                let mut args = Args::new();
                args.insert("sender".into(), Value::Address(encode_address(&tx.sender)));
                args.insert("on_completion".into(), tx.on_completion.into());
                args.insert("app_id".into(), tx.application_id.into());
                args.insert(
                    "foreign_apps".into(),
                    Value::List(tx.foreign_apps.iter().map(|&id| id.into()).collect()),
                );
                args.insert(
                    "foreign_assets".into(),
                    Value::List(tx.foreign_assets.iter().map(|&id| id.into()).collect()),
                );
                args.insert(
                    "accounts".into(),
                    Value::List(
                        tx.accounts
                            .iter()
                            .map(|a| Value::Address(encode_address(a)))
                            .collect(),
                    ),
                );
                args.insert(
                    "application_args".into(),
                    Value::List(
                        tx.application_args
                            .iter()
                            .map(|a| Value::Str(BASE64.encode(a)))
                            .collect(),
                    ),
                );
                if stib.application_id != 0 {
                    args.insert("inner_app_id".into(), stib.application_id.into());
                }
                Some(self.event("app_call", tx.application_id, args))
            }

            MatchKind::AssetTransfer => {
                if tx.tx_type != TX_TYPE_ASSET_TRANSFER {
                    return None;
                }
                let mut args = Args::new();
                args.insert("asset_id".into(), tx.xfer_asset.into());
                args.insert("amount".into(), tx.asset_amount.into());
                args.insert("sender".into(), Value::Address(encode_address(&tx.sender)));
                args.insert(
                    "asset_sender".into(),
                    Value::Address(encode_address(&tx.asset_sender)),
                );
                args.insert(
                    "receiver".into(),
                    Value::Address(encode_address(&tx.asset_receiver)),
                );
                args.insert(
                    "close_to".into(),
                    Value::Address(encode_address(&tx.asset_close_to)),
                );
                args.insert("close_amount".into(), stib.asset_closing_amount.into());
                args.insert("closing_reward".into(), stib.close_rewards.into());
                Some(self.event("asset_transfer", 0, args))
            }
        }
    }

    fn event(&self, name: &str, app_id: u64, args: Args) -> NormalizedEvent {
        NormalizedEvent {
            rule_id: self.rule_id.clone(),
            chain: String::new(),     // stamped by the scanner
            source_id: String::new(), // stamped by the scanner
            height: 0,
            block_hash: String::new(),
            tx_hash: String::new(),
            log_index: None,
            contract: None,
            app_id,
            name: name.into(),
            args,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
