//! Fixed-window rate limit decisions against the shared counter store.

use std::{future::Future, time::Duration};

use config::{FailurePolicy, LimiterConfig};
use telemetry::{
    Counter, Histogram, KeyValue,
    metrics::{COUNTER_STORE_DURATION, ROUTE_LIMIT_DECISIONS, Recorder},
};
use tokio::sync::OnceCell;

use crate::{
    error::RateLimitError,
    registry::RouteRegistry,
    route::RouteLimit,
    storage::{CounterStorage, Storage, StorageError},
};

/// Window used when a route is registered with a threshold but no window.
///
/// The largest expiry Redis accepts on every platform, about 68 years.
pub const UNBOUNDED_WINDOW: Duration = Duration::from_secs(i32::MAX as u64);

const DYNAMIC_ROUTE_LABEL: &str = "dynamic";

/// Decides whether calls to a route are allowed.
///
/// The limiter keeps no window state of its own: each decision primes the
/// route's counter in the store, increments it, and compares the new count to
/// the route's threshold. Counters reset when the store expires them.
///
/// Create one limiter at startup and share it, e.g. behind an [`Arc`](std::sync::Arc).
pub struct RateLimiter<S = Storage> {
    registry: RouteRegistry,
    storage: S,
    failure_policy: FailurePolicy,
    store_timeout: Option<Duration>,
    initialized: OnceCell<()>,
    decisions: Counter<u64>,
    store_duration: Histogram<f64>,
}

impl RateLimiter<Storage> {
    /// Create a limiter with the storage backend and static routes from the configuration.
    pub async fn new(config: &LimiterConfig) -> Result<Self, RateLimitError> {
        let routes = config
            .routes
            .iter()
            .map(RouteLimit::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let storage = Storage::from_config(&config.storage).await?;
        let store_timeout = storage.response_timeout();

        let mut builder = RateLimiter::builder(storage)
            .routes(routes)
            .failure_policy(config.failure_policy);

        if let Some(timeout) = store_timeout {
            builder = builder.store_timeout(timeout);
        }

        Ok(builder.build())
    }
}

impl<S: CounterStorage> RateLimiter<S> {
    /// Start building a limiter around any counter store.
    pub fn builder(storage: S) -> RateLimiterBuilder<S> {
        RateLimiterBuilder {
            storage,
            routes: Vec::new(),
            failure_policy: FailurePolicy::default(),
            store_timeout: None,
        }
    }

    /// The registry of route limits.
    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// The counter store.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// What checks answer when the store fails.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Prime the counter of every statically configured route.
    ///
    /// Runs once per limiter. Concurrent callers wait for the first run and
    /// later calls return immediately. A failed run is retried on the next call.
    /// Store failures are always returned here, whatever the failure policy.
    pub async fn initialize(&self) -> Result<(), RateLimitError> {
        self.initialized
            .get_or_try_init(|| async {
                let routes = self.registry.routes();

                for limit in &routes {
                    self.bounded("set_if_not_exists", self.storage.set_if_not_exists(limit.route(), 0, limit.window()))
                        .await?;
                }

                log::info!("Rate limiter initialized with {} static route(s)", routes.len());

                Ok::<_, RateLimitError>(())
            })
            .await?;

        Ok(())
    }

    /// Check a call to `route`, counting it against the route's limit.
    ///
    /// Routes without a registered limit are always allowed.
    pub async fn check(&self, route: &str) -> Result<bool, RateLimitError> {
        let Some(limit) = self.registry.lookup(route) else {
            log::debug!("No rate limit for route '{route}' - allowing");
            return Ok(true);
        };

        self.decide(&limit).await
    }

    /// Check a call to `route`, registering `threshold` per `window` as its
    /// limit if the route has none yet.
    ///
    /// Only the first registration counts: once a route has a limit, later
    /// thresholds and windows passed here are ignored.
    pub async fn check_or_register(&self, route: &str, threshold: u32, window: Duration) -> Result<bool, RateLimitError> {
        let limit = match self.registry.lookup(route) {
            Some(limit) => limit,
            None => self.registry.register_if_absent(route, threshold, window)?,
        };

        self.decide(&limit).await
    }

    /// Like [`RateLimiter::check_or_register`], with a window that never resets in practice.
    pub async fn check_or_register_threshold(&self, route: &str, threshold: u32) -> Result<bool, RateLimitError> {
        self.check_or_register(route, threshold, UNBOUNDED_WINDOW).await
    }

    async fn decide(&self, limit: &RouteLimit) -> Result<bool, RateLimitError> {
        let route = limit.route();

        let count = match self.count(limit).await {
            Ok(count) => count,
            Err(error) => {
                self.record_decision(limit, "store_error");

                return match self.failure_policy {
                    FailurePolicy::Closed => {
                        log::warn!("Rate limit store unavailable for route '{route}': {error}");
                        Err(RateLimitError::StoreUnavailable(error))
                    }
                    FailurePolicy::Open => {
                        log::warn!("Rate limit store unavailable for route '{route}', allowing: {error}");
                        Ok(true)
                    }
                };
            }
        };

        let allowed = count <= u64::from(limit.threshold());

        log::debug!(
            "Rate limit decision for route '{route}': count={count}, threshold={}, allowed={allowed}",
            limit.threshold()
        );

        self.record_decision(limit, if allowed { "allowed" } else { "denied" });

        Ok(allowed)
    }

    /// Prime, then increment. The increment must not start before priming completed.
    async fn count(&self, limit: &RouteLimit) -> Result<u64, StorageError> {
        let created = self
            .bounded(
                "set_if_not_exists",
                self.storage.set_if_not_exists(limit.route(), 0, limit.window()),
            )
            .await?;

        if created {
            log::debug!("Started a new {}s window for route '{}'", limit.window_secs(), limit.route());
        }

        self.bounded("increment", self.storage.increment(limit.route(), limit.window()))
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        let recorder = Recorder::start(&self.store_duration).with_attribute("operation", operation);

        let result = match self.store_timeout {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .unwrap_or_else(|_| Err(StorageError::Timeout(timeout))),
            None => future.await,
        };

        recorder.record(match &result {
            Ok(_) => "ok",
            Err(StorageError::Timeout(_)) => "timeout",
            Err(_) => "error",
        });

        result
    }

    fn record_decision(&self, limit: &RouteLimit, outcome: &'static str) {
        self.decisions.add(
            1,
            &[
                KeyValue::new("route", route_label(limit)),
                KeyValue::new("outcome", outcome),
            ],
        );
    }
}

/// Metric label for a route. Dynamically registered routes share one label so
/// the number of series stays bounded by the configuration.
fn route_label(limit: &RouteLimit) -> String {
    if limit.is_configured() {
        limit.route().to_string()
    } else {
        DYNAMIC_ROUTE_LABEL.to_string()
    }
}

/// Builder for a [`RateLimiter`].
pub struct RateLimiterBuilder<S> {
    storage: S,
    routes: Vec<RouteLimit>,
    failure_policy: FailurePolicy,
    store_timeout: Option<Duration>,
}

impl<S: CounterStorage> RateLimiterBuilder<S> {
    /// Set the statically configured routes, in priority order.
    pub fn routes(mut self, routes: impl IntoIterator<Item = RouteLimit>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Set what checks answer when the store fails.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Bound every store operation; an operation exceeding it counts as a store failure.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Build the rate limiter.
    pub fn build(self) -> RateLimiter<S> {
        let registry = RouteRegistry::new();
        registry.load_static(self.routes);

        let meter = telemetry::metrics::meter();

        RateLimiter {
            registry,
            storage: self.storage,
            failure_policy: self.failure_policy,
            store_timeout: self.store_timeout,
            initialized: OnceCell::new(),
            decisions: meter.u64_counter(ROUTE_LIMIT_DECISIONS).build(),
            store_duration: meter.f64_histogram(COUNTER_STORE_DURATION).with_unit("ms").build(),
        }
    }
}
