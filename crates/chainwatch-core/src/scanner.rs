//! The scanner contract shared by all chain families.

use async_trait::async_trait;

use crate::error::WatchError;
use crate::event::NormalizedEvent;

/// Drives one source forward, one confirmed block per call.
///
/// `process_next` consults the ledger cursor, enforces the confirmation
/// gate, verifies the parent hash, and advances the cursor as its final
/// persistent effect. On a reorg it rewinds the cursor and returns the
/// [`WatchError::ReorgDetected`] sentinel.
#[async_trait]
pub trait SourceScanner: Send + Sync {
    /// The source this scanner owns.
    fn source_id(&self) -> &str;

    /// Chain family slug (`"evm"` / `"algorand"`).
    fn chain(&self) -> &'static str;

    /// Process the next eligible block and return matched events.
    /// Returns an empty vec when nothing is eligible yet.
    async fn process_next(&self) -> Result<Vec<NormalizedEvent>, WatchError>;
}

/// Resolve a configured start spec against the current safe head.
///
/// `""` and `"0"` mean genesis; `"latest-N"` backs off N blocks from the
/// safe head (clamped to 0); anything else must parse as an absolute height.
pub fn resolve_start(start: &str, safe: u64) -> Result<u64, WatchError> {
    if start.is_empty() || start == "0" {
        return Ok(0);
    }
    if let Some(offset) = start.strip_prefix("latest-") {
        let n: u64 = offset
            .parse()
            .map_err(|_| WatchError::Config(format!("invalid start spec {start:?}")))?;
        return Ok(safe.saturating_sub(n));
    }
    start
        .parse()
        .map_err(|_| WatchError::Config(format!("invalid start spec {start:?}")))
}
