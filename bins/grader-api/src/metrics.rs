// Prometheus metrics for the grader API

use grader_common::SubmissionReport;
use grader_engine::evaluator::case_status;
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Submissions graded (counter with language label)
    pub static ref SUBMISSIONS_GRADED: CounterVec = CounterVec::new(
        Opts::new("grader_submissions_graded_total", "Total number of submissions graded"),
        &["language"]
    )
    .expect("metric can be created");

    // Case outcomes, so infrastructure failures stay distinct from bad submissions
    pub static ref CASE_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("grader_case_outcomes_total", "Total test case outcomes by kind"),
        &["language", "status"]
    )
    .expect("metric can be created");

    // Whole-submission grading time (in milliseconds)
    pub static ref GRADING_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "grader_grading_duration_ms",
            "Submission grading time in milliseconds"
        )
        .buckets(vec![100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0]),
        &["language"]
    )
    .expect("metric can be created");

    // Requests rejected before grading
    pub static ref REQUESTS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("grader_requests_rejected_total", "Total grading requests rejected by validation"),
        &["reason"]
    )
    .expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(SUBMISSIONS_GRADED.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(CASE_OUTCOMES.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(GRADING_DURATION.clone()))
            .expect("collector can be registered");

        REGISTRY
            .register(Box::new(REQUESTS_REJECTED.clone()))
            .expect("collector can be registered");
    });
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request_rejected(reason: &str) {
    REQUESTS_REJECTED.with_label_values(&[reason]).inc();
}

pub fn record_submission_graded(language: &str, report: &SubmissionReport, elapsed_ms: f64) {
    SUBMISSIONS_GRADED.with_label_values(&[language]).inc();
    GRADING_DURATION
        .with_label_values(&[language])
        .observe(elapsed_ms);

    for result in &report.case_results {
        CASE_OUTCOMES
            .with_label_values(&[language, case_status(result)])
            .inc();
    }
}
