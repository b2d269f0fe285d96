//! Integration tests for telemetry initialization and span helpers.

use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so a second
    // init in the same binary is allowed to fail.
    let config = dispatchq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "dispatchq-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = dispatchq::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn telemetry_rejects_malformed_log_level() {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    let config = dispatchq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "dispatchq-test".to_string(),
        log_level: "dispatchq=[".to_string(),
    };
    assert!(dispatchq::telemetry::init_telemetry(config).is_err());
}

#[test]
fn job_span_creates_and_records_completion() {
    let id = Uuid::new_v4();
    let key = dispatchq::InstanceKey::new("db1", 3306);
    let span = dispatchq::telemetry::job::start_job_span(&key, &id);
    dispatchq::telemetry::job::record_job_finished(&span, 12, false);
    dispatchq::telemetry::job::record_job_finished(&span, 40, true);
}

#[test]
fn metric_instruments_are_usable_without_exporter() {
    use opentelemetry::KeyValue;

    dispatchq::telemetry::metrics::keys_received().add(1, &[KeyValue::new("result", "queued")]);
    dispatchq::telemetry::metrics::jobs_dispatched().add(1, &[]);
    dispatchq::telemetry::metrics::jobs_completed().add(1, &[]);
    dispatchq::telemetry::metrics::job_duration_ms().record(3.5, &[]);
}
