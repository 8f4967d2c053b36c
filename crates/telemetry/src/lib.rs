//! OpenTelemetry metrics for route limit decisions and counter store calls.

pub mod metrics;

use config::TelemetryConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Keeps the meter provider alive. Dropping it flushes and shuts the provider down.
pub struct TelemetryGuard {
    provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Export everything recorded so far.
    pub fn force_flush(&self) -> anyhow::Result<()> {
        self.provider
            .force_flush()
            .map_err(|e| anyhow::anyhow!("Failed to flush metrics: {e}"))
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            log::error!("Failed to shut down the meter provider: {e}");
        }
    }
}

/// Install the global meter provider. Hold the returned guard until shutdown.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let provider = metrics::install(config)?;

    Ok(TelemetryGuard { provider })
}
