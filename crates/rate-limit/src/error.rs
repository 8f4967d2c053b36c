//! Error types for rate limiting.

use crate::storage::StorageError;

/// Errors that can occur during rate limiting.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The shared store could not be reached, failed the operation, or timed out.
    ///
    /// Whether the call counted against the limit is unknown.
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    /// A route limit was rejected before it reached the registry.
    #[error("Invalid rate limit for route '{route}': {reason}")]
    InvalidConfiguration {
        /// The route the limit was meant for.
        route: String,
        /// Why the limit was rejected.
        reason: String,
    },
}

impl RateLimitError {
    pub(crate) fn invalid(route: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            route: route.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error comes from the shared store rather than from configuration.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
