//! Storage backends for route counters.

use std::{future::Future, time::Duration};

use config::StorageConfig;

pub mod memory;
pub mod redis;
mod redis_pool;

pub use self::redis::RedisStorage;
pub use memory::InMemoryStorage;

/// Atomic counter operations the fixed-window protocol is built on.
///
/// Each method must be a single atomic operation of the backing store, safe to
/// call concurrently from any number of tasks and processes.
pub trait CounterStorage: Send + Sync {
    /// Set `key` to `value` with the given time-to-live if, and only if, the key does not exist.
    ///
    /// Returns whether the key was created. An existing key keeps both its
    /// value and its remaining time-to-live.
    fn set_if_not_exists(
        &self,
        key: &str,
        value: u64,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Increment `key` by one and return the new value.
    ///
    /// A missing key starts from zero. If the incremented key has no expiry,
    /// `ttl` is applied so that a counter can never outlive its window.
    fn increment(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<u64, StorageError>> + Send;
}

/// The storage backend selected by configuration.
pub enum Storage {
    /// In-process counters.
    Memory(InMemoryStorage),
    /// Counters shared through Redis.
    Redis(RedisStorage),
}

impl Storage {
    /// Create the storage backend described by the configuration.
    ///
    /// Redis storage checks connectivity before returning.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let storage = match config {
            StorageConfig::Memory => Storage::Memory(InMemoryStorage::new()),
            StorageConfig::Redis(redis_config) => Storage::Redis(RedisStorage::new(redis_config).await?),
        };

        Ok(storage)
    }

    /// Upper bound for a single store operation, if the backend has one.
    pub fn response_timeout(&self) -> Option<Duration> {
        match self {
            Storage::Memory(_) => None,
            Storage::Redis(storage) => storage.response_timeout(),
        }
    }
}

impl CounterStorage for Storage {
    async fn set_if_not_exists(&self, key: &str, value: u64, ttl: Duration) -> Result<bool, StorageError> {
        match self {
            Storage::Memory(storage) => storage.set_if_not_exists(key, value, ttl).await,
            Storage::Redis(storage) => storage.set_if_not_exists(key, value, ttl).await,
        }
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StorageError> {
        match self {
            Storage::Memory(storage) => storage.increment(key, ttl).await,
            Storage::Redis(storage) => storage.increment(key, ttl).await,
        }
    }
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The store could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store was reached but the operation failed.
    #[error("Query error: {0}")]
    Query(String),

    /// The operation did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}
