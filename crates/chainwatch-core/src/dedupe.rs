//! Dedupe key rendering and TTL parsing.

use std::time::Duration;

use crate::event::NormalizedEvent;

/// Window applied when a rule sets dedupe without a parseable TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Render a dedupe key from a pattern.
///
/// The literal tokens `txhash`, `logIndex`, and `app_id` are substituted
/// with the event's values; `logIndex` / `app_id` are left untouched when
/// absent / zero. An empty pattern defaults to `txhash`. Substitution is
/// plain substring replacement: patterns containing those tokens in other
/// positions are rewritten too (a documented limitation of the grammar).
pub fn render_key(pattern: &str, event: &NormalizedEvent) -> String {
    let pattern = if pattern.is_empty() { "txhash" } else { pattern };
    let mut key = pattern.replace("txhash", &event.tx_hash);
    if let Some(idx) = event.log_index {
        key = key.replace("logIndex", &idx.to_string());
    }
    if event.app_id != 0 {
        key = key.replace("app_id", &event.app_id.to_string());
    }
    key
}

/// Parse a TTL string (`"24h"`, `"15m"`, `"1h30m"`), falling back to
/// [`DEFAULT_TTL`] when unparseable.
pub fn parse_ttl(raw: &str) -> Duration {
    humantime::parse_duration(raw).unwrap_or(DEFAULT_TTL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NormalizedEvent;

    fn event(tx_hash: &str, log_index: Option<u32>, app_id: u64) -> NormalizedEvent {
        NormalizedEvent {
            rule_id: "r1".into(),
            chain: "evm".into(),
            source_id: "src".into(),
            height: 1,
            block_hash: "0xblock".into(),
            tx_hash: tx_hash.into(),
            log_index,
            contract: None,
            app_id,
            name: "Transfer".into(),
            args: Default::default(),
        }
    }

    #[test]
    fn empty_pattern_defaults_to_txhash() {
        let ev = event("0xabc", None, 0);
        assert_eq!(render_key("", &ev), "0xabc");
    }

    #[test]
    fn substitutes_all_tokens() {
        let ev = event("0xabc", Some(7), 0);
        assert_eq!(render_key("txhash:logIndex", &ev), "0xabc:7");
    }

    #[test]
    fn absent_tokens_left_untouched() {
        let ev = event("0xabc", None, 0);
        assert_eq!(render_key("txhash:logIndex", &ev), "0xabc:logIndex");
    }

    #[test]
    fn app_id_substituted_when_nonzero() {
        let ev = event("TX1", None, 123);
        assert_eq!(render_key("app_id/txhash", &ev), "123/TX1");
    }

    #[test]
    fn ttl_parsing() {
        assert_eq!(parse_ttl("1h"), Duration::from_secs(3600));
        assert_eq!(parse_ttl("15m"), Duration::from_secs(900));
        assert_eq!(parse_ttl("1h30m"), Duration::from_secs(5400));
        assert_eq!(parse_ttl("garbage"), DEFAULT_TTL);
        assert_eq!(parse_ttl(""), DEFAULT_TTL);
    }
}
