use std::time::Duration;

use config::RouteLimitConfig;

use crate::error::RateLimitError;

/// The limit enforced for one route: at most `threshold` calls per `window`.
///
/// A `RouteLimit` can only be built through [`RouteLimit::new`], so every
/// instance has a positive threshold and a window of whole, positive seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimit {
    route: String,
    threshold: u32,
    window: Duration,
    configured: bool,
}

impl RouteLimit {
    /// Validates and creates a route limit.
    pub fn new(route: impl Into<String>, threshold: u32, window: Duration) -> Result<Self, RateLimitError> {
        let route = route.into();

        if route.is_empty() {
            return Err(RateLimitError::invalid(&route, "route must not be empty"));
        }

        if threshold == 0 {
            return Err(RateLimitError::invalid(&route, "threshold must be greater than zero"));
        }

        if window.as_secs() == 0 {
            return Err(RateLimitError::invalid(&route, "window must be at least one second"));
        }

        if window.subsec_nanos() != 0 {
            return Err(RateLimitError::invalid(
                &route,
                format!("window must be a whole number of seconds, got {window:?}"),
            ));
        }

        Ok(Self {
            route,
            threshold,
            window,
            configured: false,
        })
    }

    pub(crate) fn into_configured(self) -> Self {
        Self {
            configured: true,
            ..self
        }
    }

    /// The route identifier, also the counter key in the store.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Maximum number of calls allowed within one window.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Width of the counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Width of the counting window in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }

    /// Whether the limit came from static configuration rather than dynamic registration.
    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

impl TryFrom<&RouteLimitConfig> for RouteLimit {
    type Error = RateLimitError;

    fn try_from(config: &RouteLimitConfig) -> Result<Self, Self::Error> {
        Self::new(config.route.clone(), config.threshold, config.window)
    }
}
