use std::{collections::BTreeMap, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Service identity and metric export settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Name reported as `service.name`. Defaults to `routeguard`.
    service_name: Option<String>,
    /// Extra resource attributes attached to every metric.
    resource_attributes: BTreeMap<String, String>,
    /// Where decision and store metrics are pushed.
    metrics: MetricsExportConfig,
}

impl TelemetryConfig {
    /// The configured service name, if any.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Resource attributes in key order.
    pub fn resource_attributes(&self) -> &BTreeMap<String, String> {
        &self.resource_attributes
    }

    /// The metrics exporter, or `None` when export is disabled.
    pub fn metrics_export(&self) -> Option<&MetricsExportConfig> {
        self.metrics.enabled.then_some(&self.metrics)
    }
}

/// OTLP push exporter for metrics.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsExportConfig {
    /// Metrics are only exported when enabled.
    pub enabled: bool,
    /// Collector endpoint.
    pub endpoint: Url,
    /// Wire protocol spoken to the collector.
    pub protocol: OtlpProtocol,
    /// Timeout of a single export request.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Time between two exports.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

impl Default for MetricsExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: Url::parse("http://localhost:4317").expect("default collector URL is valid"),
            protocol: OtlpProtocol::Grpc,
            timeout: Duration::from_secs(10),
            interval: Duration::from_secs(5),
        }
    }
}

/// Protocol of the OTLP exporter.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC, usually on port 4317.
    #[default]
    Grpc,
    /// HTTP with protobuf payloads, usually on port 4318.
    Http,
}
