//! Rate limiting configuration structures.

use duration_str::{deserialize_duration, deserialize_option_duration};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Configuration for the route limiter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// What a check answers when the shared store cannot be reached.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Statically configured routes, loaded once at startup in this order.
    #[serde(default)]
    pub routes: Vec<RouteLimitConfig>,
}

/// A statically configured route limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteLimitConfig {
    /// Route identifier, also used as the counter key in the store.
    pub route: String,
    /// Maximum number of operations allowed within the window.
    pub threshold: u32,
    /// Width of the fixed counting window. Must be a whole number of seconds.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
}

/// Behavior of a check when the shared store is unreachable or times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Surface the store failure to the caller, who must treat it as a denial.
    #[default]
    Closed,
    /// Log the failure and allow the request.
    Open,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process storage, only consistent within a single instance.
    #[default]
    Memory,
    /// Redis storage shared by every instance.
    Redis(Box<RedisConfig>),
}

/// Redis storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Connection URL, `redis://` or `rediss://` for TLS.
    pub url: String,
    /// Connection pool settings.
    #[serde(default)]
    pub pool: RedisPoolConfig,
    /// Certificates for `rediss://` connections.
    pub tls: Option<RedisTlsConfig>,
    /// Prepended to every route counter key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: Option<String>,
    /// Upper bound for a single Redis round-trip, pool checkout included.
    #[serde(
        default = "default_response_timeout",
        deserialize_with = "deserialize_option_duration"
    )]
    pub response_timeout: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool: RedisPoolConfig::default(),
            tls: None,
            key_prefix: default_key_prefix(),
            response_timeout: default_response_timeout(),
        }
    }
}

fn default_key_prefix() -> Option<String> {
    Some("routeguard:".to_string())
}

fn default_response_timeout() -> Option<Duration> {
    Some(Duration::from_secs(1))
}

/// Sizing and timeouts of the Redis connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisPoolConfig {
    /// Most connections open at once.
    pub max_size: usize,
    /// Time allowed to open a new connection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    /// Time a caller waits for a free connection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub wait_timeout: Duration,
    /// Time allowed to health check an idle connection before reuse.
    #[serde(deserialize_with = "deserialize_duration")]
    pub recycle_timeout: Duration,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            connect_timeout: Duration::from_secs(5),
            wait_timeout: Duration::from_secs(5),
            recycle_timeout: Duration::from_secs(5),
        }
    }
}

/// TLS settings for `rediss://` connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisTlsConfig {
    /// Accept any server certificate.
    pub insecure: bool,
    /// PEM file with the certificate authority to trust.
    pub ca_cert: Option<PathBuf>,
    /// PEM client certificate for mutual TLS. Needs `client_key`.
    pub client_cert: Option<PathBuf>,
    /// PEM client key for mutual TLS. Needs `client_cert`.
    pub client_key: Option<PathBuf>,
}
