//! Meter provider setup and the metrics recorded by the limiter.

mod names;
mod recorder;

pub use names::*;
pub use recorder::Recorder;

use anyhow::Context;
use config::{MetricsExportConfig, OtlpProtocol, TelemetryConfig};
use opentelemetry::{KeyValue, metrics::Meter};
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

const DEFAULT_SERVICE_NAME: &str = "routeguard";

/// The meter all routeguard instruments are created from.
pub fn meter() -> Meter {
    opentelemetry::global::meter(DEFAULT_SERVICE_NAME)
}

/// Build the meter provider described by `config` and install it globally.
///
/// Without an enabled exporter the provider has no readers, so instruments
/// record into nothing.
pub(crate) fn install(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let mut builder = SdkMeterProvider::builder().with_resource(resource(config));

    match config.metrics_export() {
        Some(export) => {
            let reader = PeriodicReader::builder(exporter(export)?)
                .with_interval(export.interval)
                .build();

            builder = builder.with_reader(reader);

            log::info!("Exporting metrics to {} over {:?}", export.endpoint, export.protocol);
        }
        None => log::debug!("Metrics export is disabled"),
    }

    let provider = builder.build();
    opentelemetry::global::set_meter_provider(provider.clone());

    Ok(provider)
}

fn resource(config: &TelemetryConfig) -> Resource {
    let service_name = config.service_name().unwrap_or(DEFAULT_SERVICE_NAME).to_string();

    let attributes = config
        .resource_attributes()
        .iter()
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()));

    Resource::builder()
        .with_service_name(service_name)
        .with_attributes(attributes)
        .build()
}

fn exporter(export: &MetricsExportConfig) -> anyhow::Result<MetricExporter> {
    let exporter = match export.protocol {
        OtlpProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(export.endpoint.as_str())
            .with_timeout(export.timeout)
            .build()
            .context("Failed to create the gRPC metrics exporter")?,
        OtlpProtocol::Http => MetricExporter::builder()
            .with_http()
            .with_endpoint(export.endpoint.as_str())
            .with_timeout(export.timeout)
            .build()
            .context("Failed to create the HTTP metrics exporter")?,
    };

    Ok(exporter)
}
