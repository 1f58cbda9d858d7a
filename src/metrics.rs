use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Metric name prefix for all VM Central metrics
const PREFIX: &str = "vm_central";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Tasks
    pub static ref TASK_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_task_executions_total"), "Task executions by operation and outcome"),
        &["operation", "outcome"]
    ).expect("Failed to create task_executions_total metric");

    // Background jobs
    pub static ref JOB_TICKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_ticks_total"), "Background job ticks by outcome"),
        &["job_id", "outcome"]
    ).expect("Failed to create job_ticks_total metric");

    pub static ref JOB_TICK_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_tick_duration_seconds"),
            "Background job tick duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["job_id"]
    ).expect("Failed to create job_tick_duration_seconds metric");

    // Delegation
    pub static ref DELEGATION_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_delegation_requests_total"), "Delegation requests by channel and outcome"),
        &["channel", "outcome"]
    ).expect("Failed to create delegation_requests_total metric");

    pub static ref DELEGATION_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_delegation_request_duration_seconds"),
            "Delegation round trip duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["channel"]
    ).expect("Failed to create delegation_request_duration_seconds metric");
}

pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(TASK_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_TICK_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(DELEGATION_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DELEGATION_REQUEST_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_task_execution(operation: &str, outcome: &str) {
    TASK_EXECUTIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn record_job_tick(job_id: &str, outcome: &str, duration: Duration) {
    JOB_TICKS_TOTAL.with_label_values(&[job_id, outcome]).inc();
    JOB_TICK_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn record_delegation_request(channel: &str, outcome: &str, duration: Duration) {
    DELEGATION_REQUESTS_TOTAL
        .with_label_values(&[channel, outcome])
        .inc();
    DELEGATION_REQUEST_DURATION_SECONDS
        .with_label_values(&[channel])
        .observe(duration.as_secs_f64());
}

/// Renders all registered metrics in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
