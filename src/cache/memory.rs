use super::{CacheBackend, CacheResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache entry with expiration
#[derive(Clone, Debug)]
struct CacheEntry {
    data: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn new(data: String, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: expiry_from(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() > exp)
    }
}

fn expiry_from(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.filter(|d| !d.is_zero())
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| Utc::now() + d)
}

/// In-process cache backend
#[derive(Clone, Default)]
pub struct MemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fetch a live entry, dropping it if it has expired
    async fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        {
            let store = self.store.read().await;
            match store.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut store = self.store.write().await;
        if store.get(key).is_some_and(CacheEntry::is_expired) {
            store.remove(key);
        }
        None
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live_entry(key).await.map(|entry| entry.data))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let mut store = self.store.write().await;
        store.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let mut store = self.store.write().await;
        if store.get(key).is_some_and(|entry| !entry.is_expired()) {
            return Ok(false);
        }
        store.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut store = self.store.write().await;
        match store.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                if ttl.is_zero() {
                    store.remove(key);
                } else {
                    entry.expires_at = expiry_from(Some(ttl));
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
