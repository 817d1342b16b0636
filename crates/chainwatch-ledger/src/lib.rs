//! chainwatch-ledger — the durable single-writer store behind the engine.
//!
//! Four tables carry all persistent state:
//!
//! ```text
//! cursors   source_id → (height, hash)        how far each source is processed
//! dedupe    key → expires_at                  active suppression windows
//! alerts    id (PK)                           the exactly-once barrier per alert
//! sends     (alert_id, sink_id) (PK)          at-most-once per alert/sink pair
//! ```
//!
//! Unique-constraint violations surface as [`WatchError::AlreadyExists`];
//! callers treat them as "already delivered", not as failures.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chainwatch_core::WatchError;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// A persisted scan position for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub source_id: String,
    /// The scanner has fully processed through this height.
    pub height: u64,
    /// Hash of the block at `height` as last observed.
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

/// An emitted alert record. `id` is the primary key; collisions mean the
/// alert was already recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub fingerprint: String,
    pub tx_hash: String,
    pub payload_json: String,
    pub created_at: DateTime<Utc>,
}

/// A sink delivery record, unique per `(alert_id, sink_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub alert_id: String,
    pub sink_id: String,
    /// `"ok"` or `"error"`.
    pub status: String,
    /// HTTP status code of the delivery attempt, when one was observed.
    pub response_code: Option<u16>,
    pub created_at: DateTime<Utc>,
}

/// Durable store for cursors, dedupe keys, alerts, and send receipts.
///
/// Single-writer: serialized updates suffice. Writes must be visible to the
/// next read on the same process after return.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch the cursor for a source; `None` when the source has never advanced.
    async fn get_cursor(&self, source_id: &str) -> Result<Option<Cursor>, WatchError>;

    /// Atomic insert-or-replace of a source cursor.
    async fn upsert_cursor(&self, source_id: &str, height: u64, hash: &str)
        -> Result<(), WatchError>;

    /// All cursors, ordered by source id.
    async fn list_cursors(&self) -> Result<Vec<Cursor>, WatchError>;

    /// Set or refresh a dedupe key until `expires_at` (stored UTC).
    async fn mark_dedupe(&self, key: &str, expires_at: DateTime<Utc>) -> Result<(), WatchError>;

    /// `true` iff the key exists with `expires_at > now`. Expired rows are
    /// pruned and report `false`.
    async fn is_duplicate(&self, key: &str, now: DateTime<Utc>) -> Result<bool, WatchError>;

    /// Insert an alert row. Fails with [`WatchError::AlreadyExists`] on id collision.
    async fn insert_alert(&self, alert: &Alert) -> Result<(), WatchError>;

    /// Insert a send receipt. Fails with [`WatchError::AlreadyExists`] when
    /// the `(alert_id, sink_id)` pair collides.
    async fn insert_send(&self, receipt: &SendReceipt) -> Result<(), WatchError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), WatchError>;
}
