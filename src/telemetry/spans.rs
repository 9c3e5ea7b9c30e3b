//! Span helpers for processing requests.

use tracing::{info_span, Span};

/// Extension trait for recording outcomes onto a span.
pub trait SpanExt {
    /// Record `status` and, on failure, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    fn record_latency_ms(&self, latency_ms: f64);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_latency_ms(&self, latency_ms: f64) {
        self.record("latency_ms", latency_ms);
    }
}

/// Factory for `processing_request` spans.
pub struct ProcessingSpan;

impl ProcessingSpan {
    /// Fields:
    /// - `entry_point`: parsing, prioritization or insights
    /// - `model_key`: `type:name:version` serving the request
    /// - `status`, `error.message`, `latency_ms`: filled in on completion
    pub fn new(entry_point: &str, model_key: &str) -> Span {
        info_span!(
            "processing_request",
            entry_point = %entry_point,
            model_key = %model_key,
            cached = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
