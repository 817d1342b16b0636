//! In-memory ledger for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chainwatch_core::WatchError;

use crate::{Alert, Cursor, Ledger, SendReceipt};

/// Mutex-guarded map implementation of [`Ledger`].
#[derive(Default)]
pub struct MemoryLedger {
    cursors: Mutex<HashMap<String, Cursor>>,
    dedupe: Mutex<HashMap<String, DateTime<Utc>>>,
    alerts: Mutex<HashMap<String, Alert>>,
    sends: Mutex<HashMap<(String, String), SendReceipt>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_cursor(&self, source_id: &str) -> Result<Option<Cursor>, WatchError> {
        Ok(self.cursors.lock().unwrap().get(source_id).cloned())
    }

    async fn upsert_cursor(
        &self,
        source_id: &str,
        height: u64,
        hash: &str,
    ) -> Result<(), WatchError> {
        self.cursors.lock().unwrap().insert(
            source_id.to_string(),
            Cursor {
                source_id: source_id.to_string(),
                height,
                hash: hash.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_cursors(&self) -> Result<Vec<Cursor>, WatchError> {
        let mut all: Vec<Cursor> = self.cursors.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(all)
    }

    async fn mark_dedupe(&self, key: &str, expires_at: DateTime<Utc>) -> Result<(), WatchError> {
        self.dedupe
            .lock()
            .unwrap()
            .insert(key.to_string(), expires_at);
        Ok(())
    }

    async fn is_duplicate(&self, key: &str, now: DateTime<Utc>) -> Result<bool, WatchError> {
        let mut map = self.dedupe.lock().unwrap();
        match map.get(key) {
            Some(expires) if *expires > now => Ok(true),
            Some(_) => {
                map.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), WatchError> {
        let mut map = self.alerts.lock().unwrap();
        if map.contains_key(&alert.id) {
            return Err(WatchError::AlreadyExists(alert.id.clone()));
        }
        map.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    async fn insert_send(&self, receipt: &SendReceipt) -> Result<(), WatchError> {
        let key = (receipt.alert_id.clone(), receipt.sink_id.clone());
        let mut map = self.sends.lock().unwrap();
        if map.contains_key(&key) {
            return Err(WatchError::AlreadyExists(format!(
                "{}/{}",
                receipt.alert_id, receipt.sink_id
            )));
        }
        map.insert(key, receipt.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), WatchError> {
        Ok(())
    }
}
