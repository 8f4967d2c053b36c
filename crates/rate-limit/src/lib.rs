//! Fixed-window rate limiting for named routes.
//!
//! This crate decides whether a call to a route is allowed right now, counting
//! calls in a store shared by every instance of the service:
//! - Routes are registered statically at startup or dynamically on first use
//! - Counts live in the store and reset when the store expires the counter key
//! - Redis is the shared backend; an in-memory store serves single instances and tests

#![deny(missing_docs)]

mod error;
mod limiter;
mod registry;
mod route;
mod storage;

pub use config::FailurePolicy;
pub use error::RateLimitError;
pub use limiter::{RateLimiter, RateLimiterBuilder, UNBOUNDED_WINDOW};
pub use registry::RouteRegistry;
pub use route::RouteLimit;
pub use storage::{CounterStorage, InMemoryStorage, RedisStorage, Storage, StorageError};
