//! These tests expect a Redis server on localhost:6379.

use std::time::Duration;

use integration_tests::{TestLimiter, unique_prefix};
use serde_json::json;

const REDIS_URL: &str = "redis://localhost:6379/0";

async fn redis_connection() -> redis::aio::MultiplexedConnection {
    redis::Client::open(REDIS_URL)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

async fn ttl(conn: &mut redis::aio::MultiplexedConnection, key: &str) -> i64 {
    redis::cmd("TTL").arg(key).query_async(conn).await.unwrap()
}

fn redis_config(prefix: &str, threshold: u32, window: &str) -> String {
    indoc::formatdoc! {r#"
        [limiter.storage]
        type = "redis"
        url = "{REDIS_URL}"
        key_prefix = "{prefix}"

        [[limiter.routes]]
        route = "/api/login"
        threshold = {threshold}
        window = "{window}"
    "#}
}

#[tokio::test]
#[ignore = "requires a Redis server on localhost:6379"]
async fn basic_redis_rate_limiting() {
    let config = redis_config(&unique_prefix("basic"), 3, "60s");
    let limiter = TestLimiter::new(&config).await;

    let allowed = limiter
        .calls("/api/login", 5)
        .await
        .into_iter()
        .map(|result| result["allowed"].clone())
        .collect::<Vec<_>>();

    insta::assert_json_snapshot!(allowed, @r#"
    [
      true,
      true,
      true,
      false,
      false
    ]
    "#);
}

#[tokio::test]
#[ignore = "requires a Redis server on localhost:6379"]
async fn limiters_share_counters_through_redis() {
    let config = redis_config(&unique_prefix("shared"), 4, "60s");

    let first = TestLimiter::new(&config).await;
    let second = TestLimiter::new(&config).await;

    let mut results = Vec::new();

    for call in 0..3 {
        results.push(json!({ "instance": "first", "allowed": first.limiter().check("/api/login").await.unwrap() }));
        results.push(json!({ "instance": "second", "allowed": second.limiter().check("/api/login").await.unwrap() }));

        if call == 0 {
            // Initializing a third instance mid-window must not reset the counter.
            TestLimiter::new(&config).await;
        }
    }

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "allowed": true,
        "instance": "first"
      },
      {
        "allowed": true,
        "instance": "second"
      },
      {
        "allowed": true,
        "instance": "first"
      },
      {
        "allowed": true,
        "instance": "second"
      },
      {
        "allowed": false,
        "instance": "first"
      },
      {
        "allowed": false,
        "instance": "second"
      }
    ]
    "#);
}

#[tokio::test]
#[ignore = "requires a Redis server on localhost:6379"]
async fn redis_window_expires() {
    let config = redis_config(&unique_prefix("expiry"), 1, "1s");
    let limiter = TestLimiter::new(&config).await;

    assert!(limiter.limiter().check("/api/login").await.unwrap());
    assert!(!limiter.limiter().check("/api/login").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(limiter.limiter().check("/api/login").await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Redis server on localhost:6379"]
async fn redis_dynamic_registration() {
    let config = indoc::formatdoc! {r#"
        [limiter.storage]
        type = "redis"
        url = "{REDIS_URL}"
        key_prefix = "{prefix}"
    "#, prefix = unique_prefix("dynamic")};

    let limiter = TestLimiter::new(&config).await;

    let allowed = limiter
        .calls_or_register("/api/upload", 2, Duration::from_secs(60), 3)
        .await
        .into_iter()
        .map(|result| result["allowed"].clone())
        .collect::<Vec<_>>();

    assert_eq!(allowed, vec![json!(true), json!(true), json!(false)]);
}

#[tokio::test]
#[ignore = "requires a Redis server on localhost:6379"]
async fn increment_restores_missing_expiry() {
    let prefix = unique_prefix("repair");
    let key = format!("{prefix}/api/login");
    let mut conn = redis_connection().await;

    // A counter that lost its expiry, e.g. created between priming and an expiry.
    let _: () = redis::cmd("SET").arg(&key).arg(5).query_async(&mut conn).await.unwrap();
    assert_eq!(ttl(&mut conn, &key).await, -1);

    let limiter = TestLimiter::new(&redis_config(&prefix, 3, "60s")).await;
    let allowed = limiter.limiter().check("/api/login").await.unwrap();

    let count: u64 = redis::cmd("GET").arg(&key).query_async(&mut conn).await.unwrap();
    let remaining = ttl(&mut conn, &key).await;

    assert!(!allowed);
    assert_eq!(count, 6);
    assert!((1..=60).contains(&remaining), "remaining ttl {remaining}");
}

#[tokio::test]
#[ignore = "requires a Redis server on localhost:6379"]
async fn checks_and_priming_never_extend_the_window() {
    let prefix = unique_prefix("ttl");
    let key = format!("{prefix}/api/login");
    let config = redis_config(&prefix, 100, "60s");
    let mut conn = redis_connection().await;

    let limiter = TestLimiter::new(&config).await;
    limiter.limiter().check("/api/login").await.unwrap();

    let mut previous = ttl(&mut conn, &key).await;
    assert!((1..=60).contains(&previous), "remaining ttl {previous}");

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(1100)).await;

        // A new instance primes the same counter on startup.
        TestLimiter::new(&config).await;
        limiter.limiter().check("/api/login").await.unwrap();

        let remaining = ttl(&mut conn, &key).await;
        assert!(remaining > 0, "remaining ttl {remaining}");
        assert!(remaining < previous, "ttl went from {previous} to {remaining}");

        previous = remaining;
    }

    let count: u64 = redis::cmd("GET").arg(&key).query_async(&mut conn).await.unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn unreachable_redis_is_store_unavailable() {
    let config = indoc::indoc! {r#"
        [limiter.storage]
        type = "redis"
        url = "redis://127.0.0.1:1/0"
    "#};

    let Err(error) = TestLimiter::try_new(config).await else {
        unreachable!("nothing listens on port 1");
    };

    assert!(error.is_store_unavailable());
}
