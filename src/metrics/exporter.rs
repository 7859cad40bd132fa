use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::CacheMetricsSnapshot;
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for cache metrics snapshots.
///
/// This exporter writes in the Prometheus text exposition format so it can be
/// scraped by Prometheus or forwarded to an OpenTelemetry collector.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the exporter and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_sample(&self, kind: &str, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        if let Err(err) = writeln!(writer, "# TYPE {name} {kind}\n{name} {value}") {
            tracing::warn!(metric = %name, error = %err, "failed to write metric");
        }
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send> MetricsExporter<CacheMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &CacheMetricsSnapshot) {
        let counters = [
            ("get_calls_total", snapshot.get_calls),
            ("get_hits_total", snapshot.get_hits),
            ("get_misses_total", snapshot.get_misses),
            ("computations_total", snapshot.computations),
            ("failures_total", snapshot.failures),
            ("set_calls_total", snapshot.set_calls),
            ("remove_calls_total", snapshot.remove_calls),
            ("clear_calls_total", snapshot.clear_calls),
            ("prefetches_total", snapshot.prefetches),
        ];
        for (suffix, value) in counters {
            self.write_sample("counter", suffix, value);
        }
        self.write_sample("gauge", "entries", snapshot.entries as u64);
    }
}
