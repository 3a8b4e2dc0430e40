//! Process-wide read cache for bulk table reads.
//!
//! Entries are valid while `now - fetched_at < ttl`. A failed refill never
//! falls back to an expired entry, and local writes do not touch the cache:
//! readers may see data up to one TTL old after a write.

use crate::utils::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// Injectable TTL cache keyed by backing-store identity.
///
/// Concurrent misses on the same key may each run the loader; the last
/// writer wins. A zero TTL disables caching entirely.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    entries: Arc<RwLock<HashMap<String, CacheEntry<V>>>>,
}

impl<V: Clone + Send + Sync> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 只查快取，不觸發讀取
    pub async fn peek(&self, key: &str, ttl: Duration) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    pub async fn get<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.peek(key, ttl).await {
            debug!("Cache hit for key: {}", key);
            return Ok(value);
        }

        debug!("Cache miss for key: {}", key);
        let value = loader().await?;

        if !ttl.is_zero() {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(value)
    }

    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            debug!("Invalidated cache for key: {}", key);
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
