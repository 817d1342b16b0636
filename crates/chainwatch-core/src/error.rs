//! Error types for the ChainWatch pipeline.

use thiserror::Error;

/// Errors that can occur while scanning, matching, or delivering alerts.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Transient network / RPC failure. The run loop logs and retries next tick.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// Predicate or rule compilation failure. Fatal at engine construction.
    #[error("compile error: {0}")]
    Compile(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("sink {sink_id} failed: {reason}")]
    Sink {
        sink_id: String,
        status: Option<u16>,
        reason: String,
    },

    /// Unique-constraint violation. Surfaces the ledger's at-most-once barrier.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Sentinel returned by a scanner after rewinding its cursor. Never fatal.
    #[error("reorg detected on {source_id} at height {height}: expected parent {expected}, observed {observed}")]
    ReorgDetected {
        source_id: String,
        height: u64,
        expected: String,
        observed: String,
    },

    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Returns `true` if the error is a reorg sentinel (recoverable).
    pub fn is_reorg(&self) -> bool {
        matches!(self, Self::ReorgDetected { .. })
    }

    /// Returns `true` if the error is a unique-constraint violation.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
