//! Metric instrument factories for dispatchq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an exporter installed these are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("dispatchq")
}

/// Counter: keys read from the input stream.
/// Labels: `result` ("queued" | "merged" | "rejected").
pub fn keys_received() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.keys.received")
        .with_description("Number of keys read from the input stream")
        .build()
}

/// Counter: jobs started.
pub fn jobs_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.jobs.dispatched")
        .with_description("Number of processor calls started")
        .build()
}

/// Counter: jobs whose completion was acknowledged by the coordinator.
pub fn jobs_completed() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.jobs.completed")
        .with_description("Number of processor calls completed")
        .build()
}

/// Histogram: processor call duration in milliseconds.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatchq.job.duration_ms")
        .with_description("Processor call duration in milliseconds")
        .with_unit("ms")
        .build()
}
