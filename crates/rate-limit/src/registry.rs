//! Route to limit mapping.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{error::RateLimitError, route::RouteLimit};

/// Holds the limit of every known route.
///
/// Entries are never removed or replaced: the first limit registered for a
/// route is the one enforced for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: DashMap<String, Arc<RouteLimit>>,
    static_loaded: AtomicBool,
}

impl RouteRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the statically configured limits.
    ///
    /// Only the first call has an effect and returns `true`. Within the list,
    /// the first limit for a route wins.
    pub fn load_static(&self, limits: impl IntoIterator<Item = RouteLimit>) -> bool {
        if self.static_loaded.swap(true, Ordering::AcqRel) {
            log::warn!("Static route limits were already loaded, ignoring the new set");
            return false;
        }

        for limit in limits {
            match self.routes.entry(limit.route().to_string()) {
                Entry::Occupied(existing) => {
                    log::warn!(
                        "Route '{}' is already limited to {} per {}s, ignoring duplicate limit of {} per {}s",
                        limit.route(),
                        existing.get().threshold(),
                        existing.get().window_secs(),
                        limit.threshold(),
                        limit.window_secs(),
                    );
                }
                Entry::Vacant(slot) => {
                    log::debug!(
                        "Loaded limit for route '{}': {} per {}s",
                        limit.route(),
                        limit.threshold(),
                        limit.window_secs()
                    );
                    slot.insert(Arc::new(limit.into_configured()));
                }
            }
        }

        true
    }

    /// Look up the limit of a route.
    pub fn lookup(&self, route: &str) -> Option<Arc<RouteLimit>> {
        self.routes.get(route).map(|entry| Arc::clone(entry.value()))
    }

    /// Register a limit for `route` unless one exists, and return the limit in effect.
    ///
    /// The parameters are validated first; invalid ones are rejected even when
    /// the route is already registered. When several callers race on an unseen
    /// route, exactly one of their limits is inserted and all of them get it back.
    pub fn register_if_absent(
        &self,
        route: &str,
        threshold: u32,
        window: Duration,
    ) -> Result<Arc<RouteLimit>, RateLimitError> {
        let candidate = RouteLimit::new(route, threshold, window)?;

        let entry = self.routes.entry(route.to_string()).or_insert_with(|| {
            log::debug!("Registered limit for route '{route}': {threshold} per {}s", window.as_secs());
            Arc::new(candidate)
        });

        Ok(Arc::clone(entry.value()))
    }

    /// Snapshot of all registered limits, ordered by route.
    pub fn routes(&self) -> Vec<Arc<RouteLimit>> {
        let mut routes: Vec<_> = self.routes.iter().map(|entry| Arc::clone(entry.value())).collect();
        routes.sort_by(|a, b| a.route().cmp(b.route()));
        routes
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
