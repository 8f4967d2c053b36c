use std::time::Duration;

use indoc::indoc;
use integration_tests::TestLimiter;
use serde_json::json;

#[tokio::test]
async fn static_route_limit() {
    let config = indoc! {r#"
        [[limiter.routes]]
        route = "/api/login"
        threshold = 3
        window = "60s"
    "#};

    let limiter = TestLimiter::new(config).await;
    let results = limiter.calls("/api/login", 5).await;

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "allowed": true,
        "call": 1,
        "route": "/api/login"
      },
      {
        "allowed": true,
        "call": 2,
        "route": "/api/login"
      },
      {
        "allowed": true,
        "call": 3,
        "route": "/api/login"
      },
      {
        "allowed": false,
        "call": 4,
        "route": "/api/login"
      },
      {
        "allowed": false,
        "call": 5,
        "route": "/api/login"
      }
    ]
    "#);
}

#[tokio::test]
async fn routes_are_limited_independently() {
    let config = indoc! {r#"
        [[limiter.routes]]
        route = "/api/login"
        threshold = 1
        window = "60s"

        [[limiter.routes]]
        route = "/api/search"
        threshold = 2
        window = "60s"
    "#};

    let limiter = TestLimiter::new(config).await;

    let mut results = limiter.calls("/api/login", 2).await;
    results.extend(limiter.calls("/api/search", 3).await);
    results.extend(limiter.calls("/api/health", 3).await);

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "allowed": true,
        "call": 1,
        "route": "/api/login"
      },
      {
        "allowed": false,
        "call": 2,
        "route": "/api/login"
      },
      {
        "allowed": true,
        "call": 1,
        "route": "/api/search"
      },
      {
        "allowed": true,
        "call": 2,
        "route": "/api/search"
      },
      {
        "allowed": false,
        "call": 3,
        "route": "/api/search"
      },
      {
        "allowed": true,
        "call": 1,
        "route": "/api/health"
      },
      {
        "allowed": true,
        "call": 2,
        "route": "/api/health"
      },
      {
        "allowed": true,
        "call": 3,
        "route": "/api/health"
      }
    ]
    "#);
}

#[tokio::test]
async fn counter_resets_after_window() {
    let config = indoc! {r#"
        [[limiter.routes]]
        route = "/api/export"
        threshold = 1
        window = "1s"
    "#};

    let limiter = TestLimiter::new(config).await;

    let before = limiter.calls("/api/export", 2).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let after = limiter.calls("/api/export", 2).await;

    let allowed = |results: &[serde_json::Value]| {
        results
            .iter()
            .map(|result| result["allowed"].clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(allowed(&before), vec![json!(true), json!(false)]);
    assert_eq!(allowed(&after), vec![json!(true), json!(false)]);
}

#[tokio::test]
async fn dynamic_registration_keeps_first_limit() {
    let limiter = TestLimiter::new("").await;

    let mut results = limiter
        .calls_or_register("/api/upload", 2, Duration::from_secs(60), 2)
        .await;

    // A second registration with a looser limit must not replace the first.
    results.extend(
        limiter
            .calls_or_register("/api/upload", 100, Duration::from_secs(600), 1)
            .await,
    );

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "allowed": true,
        "call": 1,
        "route": "/api/upload"
      },
      {
        "allowed": true,
        "call": 2,
        "route": "/api/upload"
      },
      {
        "allowed": false,
        "call": 1,
        "route": "/api/upload"
      }
    ]
    "#);

    let limit = limiter.limiter().registry().lookup("/api/upload").unwrap();
    assert_eq!(limit.threshold(), 2);
    assert_eq!(limit.window(), Duration::from_secs(60));
}

#[tokio::test]
async fn static_limit_wins_over_registration() {
    let config = indoc! {r#"
        [[limiter.routes]]
        route = "/api/login"
        threshold = 1
        window = "60s"
    "#};

    let limiter = TestLimiter::new(config).await;
    let results = limiter
        .calls_or_register("/api/login", 50, Duration::from_secs(1), 2)
        .await;

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "allowed": true,
        "call": 1,
        "route": "/api/login"
      },
      {
        "allowed": false,
        "call": 2,
        "route": "/api/login"
      }
    ]
    "#);
}

#[tokio::test]
async fn duplicate_static_routes_keep_first_definition() {
    let config = indoc! {r#"
        [[limiter.routes]]
        route = "/api/login"
        threshold = 2
        window = "30s"

        [[limiter.routes]]
        route = "/api/login"
        threshold = 10
        window = "5m"
    "#};

    let limiter = TestLimiter::new(config).await;

    let routes = limiter
        .limiter()
        .registry()
        .routes()
        .iter()
        .map(|limit| {
            json!({
                "route": limit.route(),
                "threshold": limit.threshold(),
                "window_secs": limit.window_secs(),
            })
        })
        .collect::<Vec<_>>();

    insta::assert_json_snapshot!(routes, @r#"
    [
      {
        "route": "/api/login",
        "threshold": 2,
        "window_secs": 30
      }
    ]
    "#);
}

#[tokio::test]
async fn concurrent_checks_share_one_counter() {
    let config = indoc! {r#"
        [[limiter.routes]]
        route = "/api/search"
        threshold = 10
        window = "60s"
    "#};

    let limiter = std::sync::Arc::new(TestLimiter::new(config).await);

    let handles = (0..40)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.limiter().check("/api/search").await })
        })
        .collect::<Vec<_>>();

    let mut allowed = 0;

    for handle in handles {
        if handle.await.unwrap().unwrap() {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 10);
}
