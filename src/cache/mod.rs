pub mod memory;
pub mod valkey;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use memory::MemoryCache;
pub use valkey::ValkeyCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend not connected")]
    NotConnected,

    #[error("cache operation failed: {0}")]
    OperationFailed(String),

    #[error("cache encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Narrow capability interface over a string-keyed store. Values are JSON
/// strings on the wire; TTLs are whole seconds, absent means no expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_raw(
        &self,
        key: &str,
        value: String,
        ttl_secs: Option<u64>,
    ) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    /// Drop every key in the configured database.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Typed facade over a backend. A stored value that no longer decodes as the
/// requested type reads as absent, never as an error, so a schema change
/// cannot poison a read path.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.backend.get_raw(key).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set_raw(key, raw, ttl_secs).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.backend.exists(key).await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear().await
    }
}
