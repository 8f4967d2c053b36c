//! Redis-based counter storage.

use std::time::Duration;

use redis::{RedisError, Script};

use super::{
    CounterStorage, StorageError,
    redis_pool::{self, Connection, Pool},
};
use config::RedisConfig;

/// Increments the counter and repairs a missing expiry in the same atomic step.
/// `TTL` answers -1 only for a key that exists without an expiry.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call("INCR", KEYS[1])
if redis.call("TTL", KEYS[1]) == -1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return count
"#;

/// Redis-based counter storage implementation.
pub struct RedisStorage {
    /// Redis connection pool.
    pool: Pool,
    /// Key prefix for all counter keys.
    key_prefix: String,
    /// Response timeout for Redis commands.
    response_timeout: Option<Duration>,
    increment: Script,
}

impl RedisStorage {
    /// Create a new Redis storage instance and check that the server answers.
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = redis_pool::create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

        log::info!("Connected to Redis for rate limit counters");

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone().unwrap_or_default(),
            response_timeout: config.response_timeout,
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Upper bound for a single Redis round-trip.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    async fn connection(&self) -> Result<Connection, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

impl CounterStorage for RedisStorage {
    async fn set_if_not_exists(&self, key: &str, value: u64, ttl: Duration) -> Result<bool, StorageError> {
        let key = self.key(key);
        let mut conn = self.connection().await?;

        // SET NX answers OK when the key was written and nil when it already existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut *conn)
            .await
            .map_err(storage_error)?;

        Ok(reply.is_some())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StorageError> {
        let key = self.key(key);
        let mut conn = self.connection().await?;

        self.increment
            .key(&key)
            .arg(ttl.as_secs())
            .invoke_async(&mut *conn)
            .await
            .map_err(storage_error)
    }
}

fn storage_error(error: RedisError) -> StorageError {
    if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal() || error.is_timeout() {
        StorageError::Connection(error.to_string())
    } else {
        StorageError::Query(error.to_string())
    }
}
