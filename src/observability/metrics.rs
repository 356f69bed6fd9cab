//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by route and status
//! - `proxy_request_duration_seconds` (histogram): handling latency by route
//! - `proxy_rate_limited_total` (counter): rejections by reason
//! - `proxy_tokens_issued_total` (counter)
//! - `proxy_token_verifications_total` (counter): presented tokens by result
//! - `proxy_upstream_requests_total` (counter): upstream replies by status
//! - `proxy_upstream_duration_seconds` (histogram)
//! - `proxy_rate_limit_keys` (gauge): tracked limiter entries after a sweep
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests can call these freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("proxy_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(reason: &'static str) {
    counter!("proxy_rate_limited_total", "reason" => reason).increment(1);
}

pub fn record_token_issued() {
    counter!("proxy_tokens_issued_total").increment(1);
}

pub fn record_token_verification(valid: bool) {
    let result = if valid { "valid" } else { "invalid" };
    counter!("proxy_token_verifications_total", "result" => result).increment(1);
}

pub fn record_upstream(status: u16, start: Instant) {
    counter!("proxy_upstream_requests_total", "status" => status.to_string()).increment(1);
    histogram!("proxy_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_tracked_keys(count: usize) {
    gauge!("proxy_rate_limit_keys").set(count as f64);
}
