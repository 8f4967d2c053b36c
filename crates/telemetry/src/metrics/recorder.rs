use std::time::Instant;

use opentelemetry::{Key, KeyValue, Value, metrics::Histogram};

/// Measures one operation and records its duration, in milliseconds, to a histogram.
///
/// ```rust,ignore
/// let histogram = meter().f64_histogram(COUNTER_STORE_DURATION).build();
///
/// let recorder = Recorder::start(&histogram).with_attribute("operation", "increment");
/// let result = storage.increment("/api/login", window).await;
/// recorder.record(if result.is_ok() { "ok" } else { "error" });
/// ```
pub struct Recorder<'a> {
    histogram: &'a Histogram<f64>,
    started: Instant,
    attributes: Vec<KeyValue>,
}

impl<'a> Recorder<'a> {
    /// Start timing now.
    pub fn start(histogram: &'a Histogram<f64>) -> Self {
        Self {
            histogram,
            started: Instant::now(),
            attributes: Vec::with_capacity(2),
        }
    }

    /// Attach an attribute to the measurement.
    pub fn with_attribute(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }

    /// Stop timing and record the elapsed time with a `status` attribute.
    pub fn record(mut self, status: &'static str) {
        let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;

        self.attributes.push(KeyValue::new("status", status));
        self.histogram.record(elapsed, &self.attributes);
    }
}
