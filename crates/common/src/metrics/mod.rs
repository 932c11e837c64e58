//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming for requests, suggestions,
//! billing webhooks, uploads and entitlement decisions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Writify metrics
pub const METRICS_PREFIX: &str = "writify";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for generation calls (typically seconds, not milliseconds)
pub const GENERATION_BUCKETS: &[f64] = &[
    0.250, 0.500, 1.000, 2.000, 4.000, 8.000, 15.00, 30.00, 60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_suggestions_total", METRICS_PREFIX),
        Unit::Count,
        "Suggestion requests by outcome"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generation service latency in seconds"
    );

    describe_counter!(
        format!("{}_webhook_events_total", METRICS_PREFIX),
        Unit::Count,
        "Payment webhook events by type and outcome"
    );

    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Document uploads by file type and storage backend"
    );

    describe_counter!(
        format!("{}_trials_expired_total", METRICS_PREFIX),
        Unit::Count,
        "Trials moved to trial_expired by the passive sweep"
    );

    describe_counter!(
        format!("{}_gate_denials_total", METRICS_PREFIX),
        Unit::Count,
        "Requests refused for lack of entitlement"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one suggestion request; `outcome` is `ok`, `fallback` or `error`
pub fn record_suggestion(outcome: &'static str, duration_secs: f64) {
    counter!(
        format!("{}_suggestions_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_generation_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record a webhook delivery outcome
pub fn record_webhook(event_type: &str, outcome: &'static str) {
    counter!(
        format!("{}_webhook_events_total", METRICS_PREFIX),
        "type" => event_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a stored upload
pub fn record_upload(file_type: &str, backend: &'static str) {
    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "file_type" => file_type.to_string(),
        "backend" => backend
    )
    .increment(1);
}

pub fn record_trial_expired() {
    counter!(format!("{}_trials_expired_total", METRICS_PREFIX)).increment(1);
}

/// Record a gate refusal; `surface` is `api` or `page`
pub fn record_gate_denial(surface: &'static str) {
    counter!(
        format!("{}_gate_denials_total", METRICS_PREFIX),
        "surface" => surface
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, GENERATION_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/api/ai-assist");
        metrics.finish(200);
        record_suggestion("ok", 0.4);
        record_webhook("checkout.session.completed", "applied");
        record_gate_denial("api");
    }
}
