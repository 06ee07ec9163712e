use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::idempotency::fingerprint::Fingerprint;
use crate::idempotency::record::CachedResponse;
use crate::observability::{get_metrics, LatencyTimer};

/// Key/value store with per-entry expiry backing the idempotency cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Short backend name used in logs and health reports.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Stores the value only if the key is absent. Returns true if it was set.
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Deletes the key only while it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

fn unavailable(err: redis::RedisError) -> AppError {
    AppError::CacheUnavailable(err.to_string())
}

/// Longest expiry either backend accepts; larger values are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.min(MAX_TTL).as_secs().max(1)
}

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Redis-backed cache sharing one multiplexed connection across requests.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
    compare_and_delete: redis::Script,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;

        Ok(Self {
            conn,
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
        })
    }

    fn record(operation: &str, timer: LatencyTimer, success: bool) {
        get_metrics().record_cache_operation("redis", operation, timer.elapsed_ms(), success);
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let timer = LatencyTimer::new();
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(key).await;
        Self::record("get", timer, result.is_ok());

        result.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let timer = LatencyTimer::new();
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.set_ex(key, value, ttl_seconds(ttl)).await;
        Self::record("set", timer, result.is_ok());

        result.map_err(unavailable)
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let timer = LatencyTimer::new();
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<String>> = conn
            .set_options(
                key,
                value,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl_seconds(ttl) as usize)),
            )
            .await;
        Self::record("set_nx", timer, result.is_ok());

        Ok(result.map_err(unavailable)?.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let timer = LatencyTimer::new();
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<i64> = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await;
        Self::record("compare_and_delete", timer, result.is_ok());

        Ok(result.map_err(unavailable)? > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

/// In-process cache with lazy expiry, for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value, expires_at(Instant::now(), ttl)));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let deadline = expires_at(now, ttl);
        let mut inserted = false;
        self.entries
            .entry(key.to_string())
            .and_modify(|(current, expires_at)| {
                if *expires_at <= now {
                    *current = value.clone();
                    *expires_at = deadline;
                    inserted = true;
                }
            })
            .or_insert_with(|| {
                inserted = true;
                (value.clone(), deadline)
            });
        Ok(inserted)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, (value, _)| value.as_slice() == expected)
            .is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn expires_at(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

/// Proof of holding an in-flight marker. Only the holder can release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Namespaced storage of cached responses on top of a [`KeyValueCache`].
#[derive(Clone)]
pub struct IdempotencyStore {
    backend: Arc<dyn KeyValueCache>,
    key_prefix: String,
}

impl IdempotencyStore {
    pub fn new(backend: Arc<dyn KeyValueCache>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn cache_key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}:{}", self.key_prefix, fingerprint)
    }

    fn lock_key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}:{}:lock", self.key_prefix, fingerprint)
    }

    /// Loads the response cached for a fingerprint, if any.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedResponse>> {
        match self.backend.get(&self.cache_key(fingerprint)).await? {
            Some(bytes) => CachedResponse::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Stores a response, replacing whatever was there.
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        record: &CachedResponse,
        ttl: Duration,
    ) -> Result<()> {
        let bytes = record.encode()?;
        self.backend
            .set(&self.cache_key(fingerprint), bytes, ttl)
            .await
    }

    /// Claims the in-flight marker for a fingerprint. `None` if another
    /// request holds it.
    pub async fn claim(&self, fingerprint: &Fingerprint, ttl: Duration) -> Result<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self
            .backend
            .set_nx(&self.lock_key(fingerprint), token.as_bytes().to_vec(), ttl)
            .await?;

        Ok(acquired.then_some(token))
    }

    /// Releases the marker if it is still ours. Returns false when it had
    /// already expired or been claimed by someone else.
    pub async fn release(&self, fingerprint: &Fingerprint, token: &LockToken) -> Result<bool> {
        self.backend
            .compare_and_delete(&self.lock_key(fingerprint), token.as_bytes())
            .await
    }
}
