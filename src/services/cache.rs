use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value backend with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, keys: &[String]) -> CacheResult<()>;
}

/// In-process backend. Expired entries are evicted lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let entry = self
            .entries
            .get(key)
            .map(|entry| (entry.0.clone(), entry.1));

        match entry {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                self.entries
                    .remove_if(key, |_, (_, expires_at)| *expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

/// Outcome of a typed cache read.
#[derive(Debug)]
pub enum CacheRead<T> {
    Hit(T),
    Miss,
    /// An entry exists but does not decode into the expected shape.
    Malformed(serde_json::Error),
}

/// Typed, TTL-aware front of a [`CacheStore`].
///
/// Backend failures never escape a read or write: they are logged and a read degrades
/// to a miss, so the cache can only slow a request down, never fail it.
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn product_key(product_id: i64) -> String {
        format!("product:{product_id}")
    }

    pub fn url_key(url: &str) -> String {
        format!("cache:{url}")
    }

    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> CacheRead<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheRead::Miss,
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                return CacheRead::Miss;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => CacheRead::Hit(value),
            Err(err) => CacheRead::Malformed(err),
        }
    }

    pub async fn write<T: Serialize + Sync>(&self, key: &str, value: &T) {
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.store.set(key, raw, self.ttl).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = result {
            warn!(key, error = %err, "cache write failed");
        }
    }

    pub async fn clear(&self, keys: &[String]) -> CacheResult<()> {
        self.store.delete(keys).await
    }
}

#[cfg(feature = "cache-redis")]
pub use redis_store::RedisCache;

#[cfg(feature = "cache-redis")]
mod redis_store {
    use super::{CacheError, CacheResult, CacheStore};
    use async_trait::async_trait;
    use redis::{aio::ConnectionManager, AsyncCommands, Client};
    use std::time::Duration;

    impl From<redis::RedisError> for CacheError {
        fn from(err: redis::RedisError) -> Self {
            CacheError::Backend(err.to_string())
        }
    }

    /// Redis backend: `GET`, `SET key value EX ttl`, `DEL key...`.
    #[derive(Clone)]
    pub struct RedisCache {
        connection: ConnectionManager,
    }

    impl RedisCache {
        pub async fn connect(url: &str) -> CacheResult<Self> {
            let client = Client::open(url)?;
            let connection = ConnectionManager::new(client).await?;
            Ok(Self { connection })
        }
    }

    #[async_trait]
    impl CacheStore for RedisCache {
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            let mut conn = self.connection.clone();
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
            let mut conn = self.connection.clone();
            let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            Ok(())
        }

        async fn delete(&self, keys: &[String]) -> CacheResult<()> {
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.connection.clone();
            let _: () = conn.del(keys).await?;
            Ok(())
        }
    }
}
