//! Key-value cache client
//!
//! A [`CacheClient`] is built once by the process bootstrap and handed to the
//! components that memoize data. The backend is Redis in production; an
//! in-memory store and a scriptable mock stand in for it in tests.

use crate::context::{Cancelled, RequestContext};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod memory;
pub mod mock;
pub mod redis;

pub use config::CacheConfig;
pub use memory::MemoryCache;
pub use mock::MockCache;
pub use redis::RedisCache;

/// Cache error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Cache operation cancelled")]
    Cancelled,
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<Cancelled> for CacheError {
    fn from(_: Cancelled) -> Self {
        CacheError::Cancelled
    }
}

/// Raw string operations every cache backend supports
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Store only when no live entry exists, `false` when the key was kept
    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> CacheResult<bool>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Set a TTL on an existing key, `false` when the key is missing
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    async fn ping(&self) -> CacheResult<()>;
}

/// Cache handle shared by collaborators
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    default_ttl: Option<Duration>,
}

impl CacheClient {
    /// Create cache client from configuration
    ///
    /// The Redis backend is pinged here so a missing server fails startup.
    pub async fn new_from_config(config: &CacheConfig) -> CacheResult<Self> {
        let backend: Arc<dyn CacheBackend> = match config.backend.as_str() {
            "redis" => Arc::new(RedisCache::connect(&config.redis_url()).await?),
            "memory" => Arc::new(MemoryCache::new()),
            other => {
                return Err(CacheError::Cache(format!(
                    "Unsupported cache backend: {other}"
                )));
            }
        };

        tracing::info!("Cache client ready (backend: {})", backend.name());

        let default_ttl = (config.default_ttl > 0).then(|| Duration::from_secs(config.default_ttl));
        Ok(Self {
            backend,
            key_prefix: config.key_prefix.clone(),
            default_ttl,
        })
    }

    /// In-memory client for tests and single-process runs
    pub fn new_memory() -> Self {
        Self::with_backend(Arc::new(MemoryCache::new()), "")
    }

    /// Client over an arbitrary backend, e.g. a [`MockCache`]
    pub fn with_backend(backend: Arc<dyn CacheBackend>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
            default_ttl: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Get and deserialize a JSON value
    pub async fn get<T>(&self, ctx: &RequestContext, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let key = self.prefixed_key(key);
        let raw = ctx.run(self.backend.get(&key)).await?;

        match raw {
            Some(data) => serde_json::from_str(&data)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Serialize and store a value, falling back to the configured default TTL
    pub async fn set<T>(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let key = self.prefixed_key(key);
        let data =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        ctx.run(self.backend.set(&key, data, ttl.or(self.default_ttl)))
            .await
    }

    /// Like [`CacheClient::set`], but never replaces a live entry
    pub async fn set_if_absent<T>(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<bool>
    where
        T: Serialize + ?Sized,
    {
        let key = self.prefixed_key(key);
        let data =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        ctx.run(self.backend.set_if_absent(&key, data, ttl.or(self.default_ttl)))
            .await
    }

    pub async fn delete(&self, ctx: &RequestContext, key: &str) -> CacheResult<()> {
        let key = self.prefixed_key(key);
        ctx.run(self.backend.delete(&key)).await
    }

    pub async fn exists(&self, ctx: &RequestContext, key: &str) -> CacheResult<bool> {
        let key = self.prefixed_key(key);
        ctx.run(self.backend.exists(&key)).await
    }

    pub async fn expire(&self, ctx: &RequestContext, key: &str, ttl: Duration) -> CacheResult<bool> {
        let key = self.prefixed_key(key);
        ctx.run(self.backend.expire(&key, ttl)).await
    }

    pub async fn ping(&self, ctx: &RequestContext) -> CacheResult<()> {
        ctx.run(self.backend.ping()).await
    }

    /// Typed view for values of type `T`
    pub fn typed<T: CachedObject>(&self) -> TypedCache<T> {
        TypedCache::new(self.clone())
    }
}

/// Types that can be stored through a [`TypedCache`]
pub trait CachedObject: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Key namespace for this type
    fn cache_prefix() -> &'static str;

    /// Optional type-specific TTL
    fn default_ttl() -> Option<Duration> {
        None
    }
}

/// Typed cache instance for a specific type T
#[derive(Clone)]
pub struct TypedCache<T: CachedObject> {
    client: CacheClient,
    _phantom: PhantomData<T>,
}

impl<T: CachedObject> TypedCache<T> {
    fn new(client: CacheClient) -> Self {
        Self {
            client,
            _phantom: PhantomData,
        }
    }

    fn cache_key(key: &str) -> String {
        format!("{}:{}", T::cache_prefix(), key)
    }

    pub async fn get(&self, ctx: &RequestContext, key: &str) -> CacheResult<Option<T>> {
        self.client.get(ctx, &Self::cache_key(key)).await
    }

    /// Set with the type's default TTL
    pub async fn set(&self, ctx: &RequestContext, key: &str, value: &T) -> CacheResult<()> {
        self.set_with_ttl(ctx, key, value, None).await
    }

    pub async fn set_with_ttl(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let ttl = ttl.or_else(T::default_ttl);
        self.client
            .set(ctx, &Self::cache_key(key), value, ttl)
            .await
    }

    /// Store with the type's default TTL unless a live entry exists
    pub async fn set_if_absent(&self, ctx: &RequestContext, key: &str, value: &T) -> CacheResult<bool> {
        self.client
            .set_if_absent(ctx, &Self::cache_key(key), value, T::default_ttl())
            .await
    }

    pub async fn delete(&self, ctx: &RequestContext, key: &str) -> CacheResult<()> {
        self.client.delete(ctx, &Self::cache_key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        id: u32,
        label: String,
    }

    impl CachedObject for Snapshot {
        fn cache_prefix() -> &'static str {
            "snapshot"
        }

        fn default_ttl() -> Option<Duration> {
            Some(Duration::from_secs(60))
        }
    }

    #[tokio::test]
    async fn test_client_round_trips_json() {
        let client = CacheClient::new_memory();
        let ctx = RequestContext::background();

        let value = Snapshot {
            id: 1,
            label: "first".to_string(),
        };
        client.set(&ctx, "k", &value, None).await.unwrap();

        let loaded: Option<Snapshot> = client.get(&ctx, "k").await.unwrap();
        assert_eq!(loaded, Some(value));
        assert!(client.exists(&ctx, "k").await.unwrap());

        client.delete(&ctx, "k").await.unwrap();
        assert!(!client.exists(&ctx, "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing_entry() {
        let client = CacheClient::new_memory();
        let typed = client.typed::<Snapshot>();
        let ctx = RequestContext::background();

        let first = Snapshot {
            id: 3,
            label: "newer".to_string(),
        };
        let second = Snapshot {
            id: 3,
            label: "older".to_string(),
        };

        assert!(typed.set_if_absent(&ctx, "3", &first).await.unwrap());
        assert!(!typed.set_if_absent(&ctx, "3", &second).await.unwrap());
        assert_eq!(typed.get(&ctx, "3").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_client_reports_bad_payload() {
        let client = CacheClient::new_memory();
        let ctx = RequestContext::background();

        client.set(&ctx, "k", "not a snapshot", None).await.unwrap();
        let err = client.get::<Snapshot>(&ctx, "k").await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_typed_cache_uses_type_prefix_and_ttl() {
        let mock = Arc::new(MockCache::new());
        let value = Snapshot {
            id: 2,
            label: "second".to_string(),
        };
        mock.expect_set("app:snapshot:2")
            .with_ttl(Duration::from_secs(60))
            .returns_ok();
        mock.expect_get("app:snapshot:2")
            .returns_value(serde_json::to_string(&value).unwrap());

        let client = CacheClient::with_backend(mock.clone(), "app:");
        let typed = client.typed::<Snapshot>();
        let ctx = RequestContext::background();

        typed.set(&ctx, "2", &value).await.unwrap();
        assert_eq!(typed.get(&ctx, "2").await.unwrap(), Some(value));
        mock.assert_expectations_met();
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_backend() {
        let mock = Arc::new(MockCache::new());
        let client = CacheClient::with_backend(mock.clone(), "");
        let (ctx, handle) = RequestContext::with_cancel();
        handle.cancel();

        let err = client.ping(&ctx).await.unwrap_err();
        assert_eq!(err, CacheError::Cancelled);
        // No expectation was registered, so any backend call would have failed differently
        mock.assert_expectations_met();
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let config = CacheConfig {
            backend: "memcached".to_string(),
            ..Default::default()
        };
        let err = CacheClient::new_from_config(&config).await.err().unwrap();
        assert!(matches!(err, CacheError::Cache(_)));
    }
}
