//! Instrument names.

/// Counter of route limit decisions. Attributes: `route`, `outcome` (`allowed`, `denied` or `store_error`).
///
/// `route` is the route for statically configured limits and `dynamic` for
/// every dynamically registered one.
pub const ROUTE_LIMIT_DECISIONS: &str = "routeguard.decisions";

/// Histogram of counter store call durations in milliseconds. Attributes: `operation`, `status` (`ok`, `error` or `timeout`).
pub const COUNTER_STORE_DURATION: &str = "routeguard.store.duration";
