use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector. Recording is a no-op until a recorder is installed.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    /// Records how the idempotency middleware handled a request.
    pub fn record_idempotency_outcome(&self, outcome: &'static str) {
        counter!("idempotency_requests_total", "outcome" => outcome).increment(1);
    }

    pub fn record_idempotency_cache_error(&self, operation: &'static str) {
        counter!("idempotency_cache_errors_total", "operation" => operation).increment(1);
    }

    pub fn record_cached_body_size(&self, bytes: usize) {
        histogram!("idempotency_cached_body_bytes").record(bytes as f64);
    }

    pub fn record_cache_operation(
        &self,
        backend: &'static str,
        operation: &str,
        duration_ms: f64,
        success: bool,
    ) {
        counter!("cache_operations_total", "backend" => backend, "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("cache_operation_duration_ms", "backend" => backend, "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("idempotency_requests_total", Unit::Count, "Requests seen by the idempotency middleware, by outcome");
    describe_counter!("idempotency_cache_errors_total", Unit::Count, "Cache failures absorbed by the idempotency middleware");
    describe_histogram!("idempotency_cached_body_bytes", Unit::Bytes, "Size of response bodies written to the idempotency cache");

    describe_counter!("cache_operations_total", Unit::Count, "Total cache backend operations");
    describe_histogram!("cache_operation_duration_ms", Unit::Milliseconds, "Cache backend latency in milliseconds");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
