//! Structured spans around lifecycle operations.

use std::time::Instant;

use tracing::{Level, Span, field, span};

/// Opens an `info` span for one lifecycle operation on one plugin.
pub fn lifecycle_span(operation: &'static str, plugin: &str) -> Span {
    span!(
        Level::INFO,
        "plugin.lifecycle",
        operation = operation,
        plugin = plugin,
        success = field::Empty,
        duration_ms = field::Empty,
    )
}

/// Times a lifecycle operation and records its outcome on the span.
pub struct LifecycleTimer {
    span: Span,
    start: Instant,
}

impl LifecycleTimer {
    pub fn start(operation: &'static str, plugin: &str) -> Self {
        Self {
            span: lifecycle_span(operation, plugin),
            start: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Records the outcome and returns the elapsed milliseconds.
    pub fn finish(self, success: bool) -> f64 {
        let elapsed = self.elapsed_ms();
        self.span.record("success", success);
        self.span.record("duration_ms", elapsed);
        elapsed
    }
}
