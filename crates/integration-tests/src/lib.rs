//! Helpers for driving a configured rate limiter the way an embedding service does.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use config::Config;
use rate_limit::{RateLimitError, RateLimiter};
use serde_json::{Value, json};

/// A limiter built from a TOML configuration and initialized.
pub struct TestLimiter {
    limiter: RateLimiter,
}

impl TestLimiter {
    /// Parse `config`, create the limiter and prime its static routes.
    pub async fn new(config: &str) -> Self {
        let limiter = Self::try_new(config).await.expect("Failed to create test limiter");

        Self { limiter }
    }

    /// Like [`TestLimiter::new`], returning the limiter error instead of failing.
    pub async fn try_new(config: &str) -> Result<RateLimiter, RateLimitError> {
        let config = Config::parse(config).expect("Test configuration must be valid");
        let limiter = RateLimiter::new(&config.limiter).await?;
        limiter.initialize().await?;

        Ok(limiter)
    }

    /// The wrapped limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Make `count` calls to a route and collect one JSON object per decision.
    pub async fn calls(&self, route: &str, count: u32) -> Vec<Value> {
        let mut results = Vec::new();

        for call in 1..=count {
            let decision = self.limiter.check(route).await;
            results.push(decision_json(route, call, decision));
        }

        results
    }

    /// Make `count` calls, registering `threshold` per `window` if the route has no limit.
    pub async fn calls_or_register(&self, route: &str, threshold: u32, window: Duration, count: u32) -> Vec<Value> {
        let mut results = Vec::new();

        for call in 1..=count {
            let decision = self.limiter.check_or_register(route, threshold, window).await;
            results.push(decision_json(route, call, decision));
        }

        results
    }
}

fn decision_json(route: &str, call: u32, decision: Result<bool, RateLimitError>) -> Value {
    match decision {
        Ok(allowed) => json!({ "route": route, "call": call, "allowed": allowed }),
        Err(error) => json!({ "route": route, "call": call, "error": error.to_string() }),
    }
}

/// A Redis key prefix no other test run shares.
pub fn unique_prefix(name: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();

    format!("routeguard_test_{name}_{timestamp}:")
}
