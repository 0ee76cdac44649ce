use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache as MokaCache;
use moka::Expiry;

use super::{CacheBackend, CacheError};

#[derive(Clone)]
struct MemoryEntry {
    payload: String,
    ttl: Option<Duration>,
}

/// Per-entry expiry: an entry carries its own TTL; `None` lives forever.
struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-process backend. Used as the fallback when no Valkey is reachable and
/// as the substrate for unit tests. Expired entries are dropped lazily on
/// access, with moka's housekeeping sweeping the rest.
pub struct MemoryCache {
    inner: MokaCache<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            inner: MokaCache::builder().expire_after(EntryTtl).build(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.inner.get(key).map(|entry| entry.payload))
    }

    async fn set_raw(
        &self,
        key: &str,
        value: String,
        ttl_secs: Option<u64>,
    ) -> Result<(), CacheError> {
        self.inner.insert(
            key.to_string(),
            MemoryEntry {
                payload: value,
                ttl: ttl_secs.map(Duration::from_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.invalidate(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.inner.get(key).is_some())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() {
        let cache = MemoryCache::new();
        cache
            .set_raw("k", "\"old\"".into(), Some(1))
            .await
            .unwrap();
        cache.set_raw("k", "\"new\"".into(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        // The overwrite removed the old TTL.
        assert_eq!(cache.get_raw("k").await.unwrap().as_deref(), Some("\"new\""));
    }

    #[tokio::test]
    async fn untouched_entries_live_forever() {
        let cache = MemoryCache::new();
        cache.set_raw("k", "1".into(), None).await.unwrap();
        assert!(cache.exists("k").await.unwrap());
    }
}
