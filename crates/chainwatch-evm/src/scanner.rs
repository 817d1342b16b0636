//! The EVM block scanner.
//!
//! One call to [`Scanner::process_next`] handles at most one block:
//!
//! 1. Compute the safe head (`latest - confirmations`) and the target
//!    height (cursor + 1, or the resolved start when no cursor exists).
//! 2. Gate: nothing happens until the target is confirmed.
//! 3. Verify `parent(target) == cursor.hash`; on mismatch rewind the
//!    cursor to `(target - 1, observed_parent)` and return the reorg
//!    sentinel. The next tick re-checks that height against the new chain.
//! 4. Fetch logs, run matchers, stamp events, then advance the cursor as
//!    the final persistent effect.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use chainwatch_core::{resolve_start, NormalizedEvent, RuleSpec, SourceScanner, WatchError};
use chainwatch_ledger::Ledger;

use crate::abi::AbiCatalog;
use crate::client::EvmClient;
use crate::matcher::RuleMatcher;

/// Chain family slug stamped onto events from this scanner.
pub const CHAIN: &str = "evm";

/// Confirmation-gated sequential scanner for one EVM source.
pub struct Scanner {
    client: Arc<dyn EvmClient>,
    ledger: Arc<dyn Ledger>,
    source_id: String,
    start_block: String,
    confirmations: u64,
    matchers: Vec<RuleMatcher>,
    addresses: Vec<String>,
}

impl Scanner {
    /// Build a scanner for a source and the log rules that reference it.
    pub fn new(
        client: Arc<dyn EvmClient>,
        ledger: Arc<dyn Ledger>,
        source_id: impl Into<String>,
        start_block: impl Into<String>,
        confirmations: u64,
        rules: &[RuleSpec],
        catalog: &AbiCatalog,
    ) -> Result<Self, WatchError> {
        let source_id = source_id.into();
        let mut matchers = Vec::new();
        let mut addresses: Vec<String> = Vec::new();
        for rule in rules {
            if rule.source != source_id {
                continue;
            }
            let m = RuleMatcher::new(rule, catalog)?;
            if !addresses.iter().any(|a| a == m.contract()) {
                addresses.push(m.contract().to_string());
            }
            matchers.push(m);
        }

        Ok(Self {
            client,
            ledger,
            source_id,
            start_block: start_block.into(),
            confirmations,
            matchers,
            addresses,
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

        let latest = self.client.header_by_number(None).await?;
        if latest.number < self.confirmations {
            return Ok(vec![]);
        }
        let safe = latest.number - self.confirmations;

        let target = match &cursor {
            Some(cur) => cur.height + 1,
            None => resolve_start(&self.start_block, safe)?,
        };

        // The confirmation gate is the sole source of finality safety.
        if target > safe {
            return Ok(vec![]);
        }

        let header = self.client.header_by_number(Some(target)).await?;

        if let Some(cur) = &cursor {
            if !header.parent_hash.eq_ignore_ascii_case(&cur.hash) {
                let rewind_to = target.saturating_sub(1);
                warn!(
                    source_id = %self.source_id,
                    height = target,
                    expected = %cur.hash,
                    observed = %header.parent_hash,
                    "reorg detected, rewinding cursor"
                );
                // The cursor now claims the prior height as unverified; the
                // next tick re-checks it against the newly observed parent.
                self.ledger
                    .upsert_cursor(&self.source_id, rewind_to, &header.parent_hash)
                    .await?;
                return Err(WatchError::ReorgDetected {
                    source_id: self.source_id.clone(),
                    height: target,
                    expected: cur.hash.clone(),
                    observed: header.parent_hash.clone(),
                });
            }
        }

        let logs = self
            .client
            .filter_logs(target, target, &self.addresses)
            .await?;

        let mut events = Vec::new();
        for log in &logs {
            if log.is_removed() {
                continue;
            }
            for m in &self.matchers {
                if let Some(mut ev) = m.match_log(log)? {
                    ev.chain = CHAIN.to_string();
                    ev.source_id = self.source_id.clone();
                    ev.height = target;
                    ev.block_hash = header.hash.clone();
                    events.push(ev);
                }
            }
        }

        debug!(
            source_id = %self.source_id,
            height = target,
            matched = events.len(),
            "block processed"
        );

        // Cursor advance is the final persistent effect of a successful tick.
        self.ledger
            .upsert_cursor(&self.source_id, target, &header.hash)
            .await?;

        Ok(events)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
