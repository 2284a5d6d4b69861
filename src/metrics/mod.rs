//! Prometheus metrics for the search service.
//!
//! Every metric lives in one global registry; [`init_metrics`] registers them
//! once at startup and [`gather_metrics`] renders the text exposition format
//! served at `/metrics`.

mod middleware;

pub use middleware::{MetricsLayer, MetricsService};

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

const NAMESPACE: &str = "ci_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    /// Completed searches.
    ///
    /// Labels: endpoint, outcome (success, invalid, cancelled, timeout, error)
    pub static ref SEARCH_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("search_requests_total", "Total number of search requests").namespace(NAMESPACE),
        &["endpoint", "outcome"]
    ).expect("Failed to create SEARCH_REQUESTS_TOTAL metric");

    /// Labels: endpoint
    pub static ref SEARCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("search_duration_seconds", "Search duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["endpoint"]
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");

    pub static ref SCAN_ARTIFACTS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("scan_artifacts_total", "Artifacts scanned").namespace(NAMESPACE)
    ).expect("Failed to create SCAN_ARTIFACTS_TOTAL metric");

    pub static ref SCAN_MATCHED_BYTES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("scan_matched_bytes_total", "Bytes of match context produced by scans")
            .namespace(NAMESPACE)
    ).expect("Failed to create SCAN_MATCHED_BYTES_TOTAL metric");

    pub static ref SCAN_TRUNCATED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("scan_truncated_total", "Scans stopped by the matched byte budget")
            .namespace(NAMESPACE)
    ).expect("Failed to create SCAN_TRUNCATED_TOTAL metric");

    pub static ref JOBS_REFRESH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("jobs_refresh_total", "Job list refreshes").namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create JOBS_REFRESH_TOTAL metric");
}

/// Register every metric with the global registry. Fails if called twice.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCAN_ARTIFACTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCAN_MATCHED_BYTES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SCAN_TRUNCATED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(JOBS_REFRESH_TOTAL.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Record one finished search
pub fn record_search(endpoint: &str, outcome: &str, elapsed_secs: f64) {
    SEARCH_REQUESTS_TOTAL
        .with_label_values(&[endpoint, outcome])
        .inc();
    SEARCH_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(elapsed_secs);
}
