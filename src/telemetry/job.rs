//! Span helpers for dispatched jobs.

use tracing::Span;
use uuid::Uuid;

/// Start the span a single processor call runs inside.
///
/// `job.duration_ms` is declared empty and filled by [`record_job_finished`].
pub fn start_job_span(key: &dyn std::fmt::Debug, job_id: &Uuid) -> Span {
    tracing::info_span!(
        "dispatch.job",
        "job.key" = ?key,
        "job.id" = %job_id,
        "job.duration_ms" = tracing::field::Empty,
    )
}

/// Record how long the processor ran and emit a completion event in the span.
pub fn record_job_finished(span: &Span, duration_ms: u64, panicked: bool) {
    span.record("job.duration_ms", duration_ms);
    span.in_scope(|| {
        if panicked {
            tracing::warn!(duration_ms, "processor panicked; releasing slot");
        } else {
            tracing::debug!(duration_ms, "job finished");
        }
    });
}
