//! Metrics collection and exposition.
//!
//! # Metrics
//! - `imgd_requests_total` (counter): finished requests by status class
//! - `imgd_request_duration_seconds` (histogram): latency distribution
//! - `imgd_requests_in_flight` (gauge): committed requests
//! - `imgd_admission_rejections_total` (counter): gate rejections
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Status is recorded by class, not exact code, to bound cardinality

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Must run inside a tokio
/// runtime. Failure is logged and otherwise ignored; the service runs
/// fine without an exporter.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// One more committed request (executing or queued).
pub fn record_request_started() {
    metrics::gauge!("imgd_requests_in_flight").increment(1.0);
}

/// A committed request finished or was cancelled.
pub fn record_request_finished() {
    metrics::gauge!("imgd_requests_in_flight").decrement(1.0);
}

/// The admission gate turned a request away.
pub fn record_admission_rejected() {
    metrics::counter!("imgd_admission_rejections_total").increment(1);
}

/// A request finished with `status` after `elapsed`.
pub fn record_request(status: u16, elapsed: Duration) {
    let class = match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    metrics::counter!("imgd_requests_total", "class" => class).increment(1);
    metrics::histogram!("imgd_request_duration_seconds").record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_are_noops_without_an_exporter() {
        record_request_started();
        record_request_finished();
        record_admission_rejected();
        record_request(200, Duration::from_millis(5));
        record_request(503, Duration::from_micros(80));
    }
}
