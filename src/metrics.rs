//! Observability metrics for the harvester
//!
//! Uses the `metrics` facade for low-overhead collection. Without an installed
//! recorder every call is a no-op; [`init_metrics`] installs a Prometheus
//! exporter with a scrape endpoint.
//!
//! Counters:
//! - `http_requests_total{status}` and `http_request_duration_seconds`
//! - `samples_retained_total`
//! - `destinations_completed_total`
//! - `batch_retries_total`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

static METRICS_ADDR: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus exporter
///
/// Idempotent: a second call with any address is ignored.
///
/// # Errors
/// Returns an error if the exporter cannot bind or a recorder is already installed
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(existing) = METRICS_ADDR.get() {
        debug!("Metrics already initialized on {}, skipping", existing);
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the measurement API"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "samples_retained_total",
        Unit::Count,
        "RTT samples appended to destination logs"
    );
    describe_counter!(
        "destinations_completed_total",
        Unit::Count,
        "Destination anchors that reached a terminal state"
    );
    describe_counter!(
        "batch_retries_total",
        Unit::Count,
        "Whole-batch resubmissions after transient failures"
    );

    let _ = METRICS_ADDR.set(addr);
    Ok(())
}

/// Record a finished HTTP request
pub fn record_http_request(status: &str, duration: Duration) {
    counter!("http_requests_total", "status" => status.to_string()).increment(1);
    histogram!("http_request_duration_seconds").record(duration.as_secs_f64());
}

/// Record samples appended for a destination
pub fn record_samples_retained(count: usize) {
    counter!("samples_retained_total").increment(count as u64);
}

/// Record a destination reaching `Done`
pub fn record_destination_completed(fully_satisfied: bool) {
    counter!(
        "destinations_completed_total",
        "satisfied" => fully_satisfied.to_string(),
    )
    .increment(1);
}

/// Record a whole-batch resubmission
pub fn record_batch_retry(attempt: u32, backoff: Duration) {
    counter!("batch_retries_total").increment(1);
    debug!(
        attempt,
        backoff_ms = backoff.as_millis() as u64,
        "Batch retry recorded"
    );
}
