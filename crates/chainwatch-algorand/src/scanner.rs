//! The Algorand round scanner.
//!
//! Same shape as the EVM scanner: confirmation gate, previous-block-hash
//! verification against the cursor, one-round rewind on mismatch, cursor
//! advance as the final persistent effect. The canonical block hash comes
//! from the node's hash endpoint; the parent check uses the block header's
//! `prev` digest in the same base32 rendering.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use chainwatch_core::{resolve_start, NormalizedEvent, RuleSpec, SourceScanner, WatchError};
use chainwatch_ledger::Ledger;

use crate::block::{decode_block, digest_to_string, transaction_id};
use crate::client::AlgodClient;
use crate::matcher::RuleMatcher;

/// Chain family slug stamped onto events from this scanner.
pub const CHAIN: &str = "algorand";

/// Confirmation-gated sequential scanner for one Algorand source.
pub struct Scanner {
    client: Arc<dyn AlgodClient>,
    ledger: Arc<dyn Ledger>,
    source_id: String,
    start_round: String,
    confirmations: u64,
    matchers: Vec<RuleMatcher>,
}

impl Scanner {
    /// Build a scanner for a source and the rules that reference it.
    pub fn new(
        client: Arc<dyn AlgodClient>,
        ledger: Arc<dyn Ledger>,
        source_id: impl Into<String>,
        start_round: impl Into<String>,
        confirmations: u64,
        rules: &[RuleSpec],
    ) -> Result<Self, WatchError> {
        let source_id = source_id.into();
        let mut matchers = Vec::new();
        for rule in rules {
            if rule.source != source_id {
                continue;
            }
            matchers.push(RuleMatcher::new(rule)?);
        }

        Ok(Self {
            client,
            ledger,
            source_id,
            start_round: start_round.into(),
            confirmations,
            matchers,
        })
    }
}

#[async_trait]
impl SourceScanner for Scanner {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn chain(&self) -> &'static str {
        CHAIN
    }

    async fn process_next(&self) -> Result<Vec<NormalizedEvent>, WatchError> {
        let cursor = self.ledger.get_cursor(&self.source_id).await?;

        let latest = self.client.last_round().await?;
        if latest < self.confirmations {
            return Ok(vec![]);
        }
        let safe = latest - self.confirmations;

        let target = match &cursor {
            Some(cur) => cur.height + 1,
            None => resolve_start(&self.start_round, safe)?,
        };

        if target > safe {
            return Ok(vec![]);
        }

        let raw = self.client.block_raw(target).await?;
        let block = decode_block(&raw)?;

        if let Some(cur) = &cursor {
            let prev = digest_to_string(&block.previous_block_hash);
            if prev != cur.hash {
                let rewind_to = target.saturating_sub(1);
                warn!(
                    source_id = %self.source_id,
                    round = target,
                    expected = %cur.hash,
                    observed = %prev,
                    "reorg detected, rewinding cursor"
                );
                self.ledger
                    .upsert_cursor(&self.source_id, rewind_to, &prev)
                    .await?;
                return Err(WatchError::ReorgDetected {
                    source_id: self.source_id.clone(),
                    height: target,
                    expected: cur.hash.clone(),
                    observed: prev,
                });
            }
        }

        let block_hash = self.client.block_hash(target).await?;

        let mut events = Vec::new();
        for stib in &block.payset {
            let mut tx_hash: Option<String> = None;
            for m in &self.matchers {
                if let Some(mut ev) = m.match_txn(stib) {
                    let txid = match &tx_hash {
                        Some(id) => id.clone(),
                        None => {
                            let id = transaction_id(&stib.txn)?;
                            tx_hash = Some(id.clone());
                            id
                        }
                    };
                    ev.chain = CHAIN.to_string();
                    ev.source_id = self.source_id.clone();
                    ev.height = target;
                    ev.block_hash = block_hash.clone();
                    ev.tx_hash = txid;
                    events.push(ev);
                }
            }
        }

        debug!(
            source_id = %self.source_id,
            round = target,
            matched = events.len(),
            "round processed"
        );

        self.ledger
            .upsert_cursor(&self.source_id, target, &block_hash)
            .await?;

        Ok(events)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
