//! Storage backends for rate limit records.
//!
//! The limiter only needs `get` and `set` over opaque bytes. No atomic
//! read-modify-write is assumed, so any key-value store fits.

use async_trait::async_trait;
use headwall_core::{DirectiveMap, PolicyValue, SecurityError, StorageDriverConfig};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the `lruCache` driver when `options.max` is not set.
pub const DEFAULT_LRU_CAPACITY: usize = 1000;

/// Error types for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes could not be decoded
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for SecurityError {
    fn from(err: StoreError) -> Self {
        Self::store(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value store backing the rate limiter
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the bytes stored under `key`
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove `key`
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Check if the backend is healthy
    async fn health_check(&self) -> StoreResult<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether several processes share this store
    fn is_distributed(&self) -> bool;
}

/// In-process store with least-recently-used eviction.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: Mutex<LruCache<String, Vec<u8>>>,
    name: &'static str,
}

impl MemoryBackend {
    /// Store holding at most `capacity` identities.
    #[must_use]
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            name: "lruCache",
        }
    }

    /// Store without eviction.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            name: "memory",
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.entries.lock().put(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().pop(key);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

fn capacity(options: &DirectiveMap) -> Result<NonZeroUsize, SecurityError> {
    match options.get("max") {
        None => NonZeroUsize::new(DEFAULT_LRU_CAPACITY)
            .ok_or_else(|| SecurityError::config("lruCache capacity must be positive")),
        Some(value) => value
            .as_u64()
            .and_then(|max| usize::try_from(max).ok())
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| {
                SecurityError::config(format!(
                    "rateLimiter.driver.options.max must be a positive integer, got {}",
                    value.kind()
                ))
            }),
    }
}

/// Build a built-in backend from a driver section.
pub fn build_backend(driver: &StorageDriverConfig) -> Result<Arc<dyn StorageBackend>, SecurityError> {
    match driver.name.as_str() {
        "lruCache" => Ok(Arc::new(MemoryBackend::bounded(capacity(&driver.options)?))),
        "memory" => Ok(Arc::new(MemoryBackend::unbounded())),
        other => Err(SecurityError::config(format!(
            "unknown rate limiter driver '{other}'"
        ))),
    }
}

/// Whether `name` is a built-in driver.
#[must_use]
pub fn is_builtin_driver(name: &str) -> bool {
    matches!(name, "lruCache" | "memory")
}

/// Driver name of a `rateLimiter` section, if the section sets one.
#[must_use]
pub fn driver_name(rate_limiter: &PolicyValue) -> Option<&str> {
    match rate_limiter.get("driver")? {
        PolicyValue::Scalar(name) => Some(name),
        driver => driver.get("name").and_then(PolicyValue::as_scalar),
    }
}
