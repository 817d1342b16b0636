//! SQLite ledger backend.
//!
//! Persists cursors, dedupe keys, alerts, and send receipts to a single
//! SQLite file. Uses `sqlx` with WAL mode; timestamps are stored as Unix
//! milliseconds (UTC).
//!
//! # Usage
//! ```rust,no_run
//! use chainwatch_ledger::SqliteLedger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let ledger = SqliteLedger::open("./watch.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let ledger = SqliteLedger::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainwatch_core::WatchError;

use crate::{Alert, Cursor, Ledger, SendReceipt};

/// SQLite-backed ledger.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./watch.db"`) or a full SQLite
    /// URL (`"sqlite:./watch.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, WatchError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(storage_err)?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Open an in-memory database. All data is lost when the pool drops.
    ///
    /// A single connection is used so every handle sees the same database.
    pub async fn in_memory() -> Result<Self, WatchError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    async fn init_schema(&self) -> Result<(), WatchError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        sqlx::query("PRAGMA busy_timeout=5000;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        let tables = [
            "CREATE TABLE IF NOT EXISTS cursors (
                source_id  TEXT PRIMARY KEY,
                height     INTEGER NOT NULL,
                hash       TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS alerts (
                id           TEXT PRIMARY KEY,
                rule_id      TEXT NOT NULL,
                fingerprint  TEXT,
                tx_hash      TEXT,
                payload_json TEXT,
                created_at   INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS sends (
                alert_id      TEXT NOT NULL,
                sink_id       TEXT NOT NULL,
                status        TEXT NOT NULL,
                response_code INTEGER,
                created_at    INTEGER NOT NULL,
                PRIMARY KEY (alert_id, sink_id)
            );",
            "CREATE TABLE IF NOT EXISTS dedupe (
                key        TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            );",
        ];
        for ddl in tables {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn get_cursor(&self, source_id: &str) -> Result<Option<Cursor>, WatchError> {
        let row = sqlx::query(
            "SELECT source_id, height, hash, updated_at FROM cursors WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| Cursor {
            source_id: r.get("source_id"),
            height: r.get::<i64, _>("height") as u64,
            hash: r.get("hash"),
            updated_at: millis_to_utc(r.get::<i64, _>("updated_at")),
        }))
    }

    async fn upsert_cursor(
        &self,
        source_id: &str,
        height: u64,
        hash: &str,
    ) -> Result<(), WatchError> {
        if source_id.is_empty() {
            return Err(WatchError::Storage("source_id required".into()));
        }
        sqlx::query(
            "INSERT INTO cursors (source_id, height, hash, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(source_id) DO UPDATE SET
               height = excluded.height,
               hash = excluded.hash,
               updated_at = excluded.updated_at",
        )
        .bind(source_id)
        .bind(height as i64)
        .bind(hash)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(source_id, height, hash, "cursor upserted");
        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<Cursor>, WatchError> {
        let rows = sqlx::query(
            "SELECT source_id, height, hash, updated_at FROM cursors ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|r| Cursor {
                source_id: r.get("source_id"),
                height: r.get::<i64, _>("height") as u64,
                hash: r.get("hash"),
                updated_at: millis_to_utc(r.get::<i64, _>("updated_at")),
            })
            .collect())
    }

    async fn mark_dedupe(&self, key: &str, expires_at: DateTime<Utc>) -> Result<(), WatchError> {
        if key.is_empty() {
            return Err(WatchError::Storage("dedupe key required".into()));
        }
        sqlx::query(
            "INSERT INTO dedupe (key, expires_at) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn is_duplicate(&self, key: &str, now: DateTime<Utc>) -> Result<bool, WatchError> {
        if key.is_empty() {
            return Err(WatchError::Storage("dedupe key required".into()));
        }
        let row = sqlx::query("SELECT expires_at FROM dedupe WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        let Some(row) = row else {
            return Ok(false);
        };
        let expires = row.get::<i64, _>("expires_at");
        if expires > now.timestamp_millis() {
            return Ok(true);
        }

        // Expired rows are semantically absent; prune on read.
        sqlx::query("DELETE FROM dedupe WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(false)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), WatchError> {
        if alert.id.is_empty() || alert.rule_id.is_empty() {
            return Err(WatchError::Storage("alert id and rule_id required".into()));
        }
        sqlx::query(
            "INSERT INTO alerts (id, rule_id, fingerprint, tx_hash, payload_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.id)
        .bind(&alert.rule_id)
        .bind(&alert.fingerprint)
        .bind(&alert.tx_hash)
        .bind(&alert.payload_json)
        .bind(alert.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_err(e, &alert.id))?;

        debug!(alert_id = %alert.id, rule_id = %alert.rule_id, "alert recorded");
        Ok(())
    }

    async fn insert_send(&self, receipt: &SendReceipt) -> Result<(), WatchError> {
        if receipt.alert_id.is_empty() || receipt.sink_id.is_empty() || receipt.status.is_empty() {
            return Err(WatchError::Storage(
                "alert_id, sink_id, and status required".into(),
            ));
        }
        sqlx::query(
            "INSERT INTO sends (alert_id, sink_id, status, response_code, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&receipt.alert_id)
        .bind(&receipt.sink_id)
        .bind(&receipt.status)
        .bind(receipt.response_code.map(|c| c as i64))
        .bind(receipt.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_err(e, &format!("{}/{}", receipt.alert_id, receipt.sink_id)))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), WatchError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> WatchError {
    WatchError::Storage(e.to_string())
}

/// Map unique-constraint violations to the distinguishable error kind.
fn constraint_err(e: sqlx::Error, key: &str) -> WatchError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return WatchError::AlreadyExists(key.to_string());
        }
    }
    storage_err(e)
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
