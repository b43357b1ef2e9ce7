// HTTP route handlers for the grader API

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use grader_common::GradingRequest;
use grader_engine::reporter;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::{metrics, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct GradeParams {
    #[serde(default)]
    pub format: Option<String>,
}

fn bad_request(reason: &str, message: String) -> Response {
    reject(StatusCode::BAD_REQUEST, reason, message)
}

fn reject(status: StatusCode, reason: &str, message: String) -> Response {
    metrics::record_request_rejected(reason);
    warn!(reason = reason, status = status.as_u16(), error = %message, "Grading request rejected");
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// POST /grade - Grade a submission synchronously
pub async fn grade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GradeParams>,
    payload: Result<Json<GradingRequest>, JsonRejection>,
) -> Response {
    let text_output = match params.format.as_deref() {
        None | Some("json") => false,
        Some("text") => true,
        Some(other) => {
            return bad_request(
                "unknown_format",
                format!("unknown format '{}' (expected 'json' or 'text')", other),
            )
        }
    };

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                "body_too_large",
                rejection.body_text(),
            )
        }
        Err(rejection) => return bad_request("malformed_request", rejection.body_text()),
    };

    if let Err(rejection) = request.validate(state.config.max_time_limit_ms) {
        return bad_request(rejection.reason(), rejection.to_string());
    }

    let language = request.language.to_string();
    let time_limit_ms = request.effective_time_limit_ms(state.config.time_limit_ms);
    let start = Instant::now();

    let report = state
        .grader
        .grade_submission(&request.submission(), &request.test_cases, time_limit_ms)
        .await;

    let elapsed_ms = start.elapsed().as_millis() as f64;
    metrics::record_submission_graded(&language, &report, elapsed_ms);
    info!(
        language = %language,
        passed = report.passed_cases,
        total = report.total_cases,
        elapsed_ms = elapsed_ms,
        "Grading request served"
    );

    if text_output {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            reporter::to_text(&report),
        )
            .into_response()
    } else {
        (StatusCode::OK, Json(reporter::to_json(&report))).into_response()
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
