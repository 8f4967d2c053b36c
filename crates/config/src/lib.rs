//! Routeguard configuration structures to map the routeguard.toml configuration.

#![deny(missing_docs)]

mod loader;
mod rate_limit;
mod telemetry;

use std::path::Path;

use serde::Deserialize;

pub use rate_limit::*;
pub use telemetry::{MetricsExportConfig, OtlpProtocol, TelemetryConfig};

/// Main configuration structure for the Routeguard application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Route limiter settings.
    #[serde(default)]
    pub limiter: LimiterConfig,
    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Parse configuration from a TOML string, applying the same expansion
    /// and validation as [`Config::load`].
    pub fn parse(content: &str) -> anyhow::Result<Config> {
        loader::parse(content)
    }

    /// Problems that do not prevent loading, such as a route configured twice.
    ///
    /// Loading does not log these, so callers can report them once logging is set up.
    pub fn warnings(&self) -> Vec<String> {
        loader::duplicate_routes(self)
    }
}
