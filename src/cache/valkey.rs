use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{CacheBackend, CacheError};

/// Valkey/Redis backend. The connection manager reconnects on its own; every
/// command failure surfaces as `CacheError::OperationFailed`.
#[derive(Clone)]
pub struct ValkeyCache {
    manager: ConnectionManager,
}

impl ValkeyCache {
    /// Connect and verify the server responds. The URL carries the database
    /// index, so `clear` only ever flushes the configured database.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|_| CacheError::NotConnected)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|_| CacheError::NotConnected)?;

        let cache = Self { manager };
        let mut conn = cache.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|_| CacheError::NotConnected)?;
        Ok(cache)
    }
}

fn op_err(e: redis::RedisError) -> CacheError {
    CacheError::OperationFailed(e.to_string())
}

#[async_trait]
impl CacheBackend for ValkeyCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(op_err)
    }

    async fn set_raw(
        &self,
        key: &str,
        value: String,
        ttl_secs: Option<u64>,
    ) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        match ttl_secs {
            Some(ttl) => redis::cmd("SETEX")
                .arg(key)
                .arg(ttl)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .map_err(op_err),
            None => redis::cmd("SET")
                .arg(key)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .map_err(op_err),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(op_err)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(op_err)?;
        Ok(n > 0)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(op_err)
    }
}
