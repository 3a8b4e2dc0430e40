//! Mutual exclusion for key-scanned row mutations.
//!
//! A row number is only meaningful until the next append or resort, so every
//! `find_row_by_key` + `update_cell` pair must run under a [`KeyGuard`] for its
//! `(table, key)`. Keyed work holds the table gate shared; a resort holds it
//! exclusively, which keeps row positions fixed for the lifetime of a guard.
//!
//! This only serializes callers inside one process. Writers in other
//! processes (or people editing the sheet by hand) can still move rows.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Default)]
pub struct KeyGate {
    keys: DashMap<String, Arc<Mutex<()>>>,
    tables: DashMap<String, Arc<RwLock<()>>>,
}

/// Held for the duration of one keyed mutation.
pub struct KeyGuard<'a> {
    gate: &'a KeyGate,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    _table: OwnedRwLockReadGuard<()>,
}

impl KeyGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_lock(&self, table: &str) -> Arc<RwLock<()>> {
        self.tables.entry(table.to_string()).or_default().clone()
    }

    /// 對 (table, key) 取得互斥鎖；同一張表的 resort 進行中會等待
    pub async fn lock_key(&self, table: &str, key: &str) -> KeyGuard<'_> {
        let table_guard = self.table_lock(table).read_owned().await;

        let composite = format!("{}{}{}", table, KEY_SEPARATOR, key);
        let mutex = self.keys.entry(composite.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;

        KeyGuard {
            gate: self,
            key: composite,
            guard: Some(guard),
            _table: table_guard,
        }
    }

    /// Shared table access for operations that add rows without moving existing ones.
    pub async fn lock_table_shared(&self, table: &str) -> OwnedRwLockReadGuard<()> {
        self.table_lock(table).read_owned().await
    }

    /// Exclusive table access for operations that move rows.
    pub async fn lock_table_exclusive(&self, table: &str) -> OwnedRwLockWriteGuard<()> {
        self.table_lock(table).write_owned().await
    }

    /// 目前仍在追蹤的 key 數量（閒置的 key 會在釋放時移除）
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.gate
            .keys
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
