use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::cache::{Cache, CacheError};
use crate::snowflake::SnowflakeGenerator;

/// Returned by `snowflake_for_handle` when the handle has never been seen.
/// A well-formed snowflake is always positive, so `0` is unambiguous.
pub const UNRESOLVED: i64 = 0;

fn did_key(did: &str) -> String {
    format!("did_to_snowflake:{did}")
}
fn did_inverse_key(id: i64) -> String {
    format!("snowflake_to_did:{id}")
}
fn aturi_key(uri: &str) -> String {
    format!("at_uri_to_snowflake:{uri}")
}
fn aturi_inverse_key(id: i64) -> String {
    format!("snowflake_to_at_uri:{id}")
}
fn handle_key(handle: &str) -> String {
    format!("handle_to_did:{handle}")
}

/// Bidirectional projection between AT Protocol identifiers and
/// Mastodon-style snowflake IDs.
///
/// DIDs map deterministically (SHA-256 truncated to 63 bits) because the
/// resulting IDs leak into client state and must survive restarts with a
/// cold cache. AT URIs get fresh time-ordered snowflakes so clients sorting
/// statuses by ID see newer posts with larger IDs; once observed, a URI's
/// ID is pinned by the cache.
#[derive(Clone)]
pub struct IdMapper {
    cache: Cache,
    snowflakes: Arc<SnowflakeGenerator>,
}

impl IdMapper {
    pub fn new(cache: Cache, snowflakes: Arc<SnowflakeGenerator>) -> Self {
        Self { cache, snowflakes }
    }

    pub async fn snowflake_for_did(&self, did: &str) -> Result<i64, CacheError> {
        if let Some(id) = self.cache.get::<i64>(&did_key(did)).await? {
            return Ok(id);
        }

        let id = deterministic_did_id(did);
        self.store_pair(&did_key(did), &did_inverse_key(id), did, id)
            .await;
        Ok(id)
    }

    pub async fn snowflake_for_aturi(&self, uri: &str) -> Result<i64, CacheError> {
        if let Some(id) = self.cache.get::<i64>(&aturi_key(uri)).await? {
            return Ok(id);
        }

        // Two racers may both mint an ID here; the second write wins and the
        // loser's snowflake is simply never indexed.
        let id = self.snowflakes.generate().await;
        self.store_pair(&aturi_key(uri), &aturi_inverse_key(id), uri, id)
            .await;
        Ok(id)
    }

    /// Resolve a handle through the handle index. Returns [`UNRESOLVED`]
    /// when no upstream resolution has passed through the gateway yet.
    pub async fn snowflake_for_handle(&self, handle: &str) -> Result<i64, CacheError> {
        match self.cache.get::<String>(&handle_key(handle)).await? {
            Some(did) => self.snowflake_for_did(&did).await,
            None => Ok(UNRESOLVED),
        }
    }

    pub async fn did_for_snowflake(&self, id: i64) -> Result<Option<String>, CacheError> {
        self.cache.get(&did_inverse_key(id)).await
    }

    pub async fn aturi_for_snowflake(&self, id: i64) -> Result<Option<String>, CacheError> {
        self.cache.get(&aturi_inverse_key(id)).await
    }

    /// Record an upstream handle resolution. Best-effort: the translators
    /// call this on every profile that passes through and a failed write
    /// must not fail their request.
    pub async fn record_handle(&self, handle: &str, did: &str) {
        if let Err(e) = self
            .cache
            .set(&handle_key(handle), &did.to_string(), None)
            .await
        {
            tracing::warn!(handle, error = %e, "failed to index handle");
        }
    }

    /// Persist both directions of a mapping. Best-effort on each side: a
    /// write that fails to flush must not fail the user-visible request,
    /// since the forward value is already determined.
    async fn store_pair(&self, forward_key: &str, inverse_key: &str, raw: &str, id: i64) {
        if let Err(e) = self.cache.set(forward_key, &id, None).await {
            tracing::warn!(key = forward_key, error = %e, "failed to store id mapping");
        }
        if let Err(e) = self.cache.set(inverse_key, &raw.to_string(), None).await {
            tracing::warn!(key = inverse_key, error = %e, "failed to store inverse id mapping");
        }
    }
}

/// SHA-256 of the DID, first 8 bytes big-endian, masked to 63 bits.
fn deterministic_did_id(did: &str) -> i64 {
    let digest = Sha256::digest(did.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) & 0x7FFF_FFFF_FFFF_FFFF) as i64
}
