// Route definitions for the grader API

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use grader_common::MAX_REQUEST_BODY_BYTES;
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/grade",
            post(handlers::grade).layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES)),
        )
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use grader_common::{GraderConfig, MAX_TEST_INPUT_BYTES};
    use grader_engine::{Grader, LanguageConfigManager, ProcessEngine, Sandbox};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        metrics::init_metrics();
        let engine = ProcessEngine::new(
            LanguageConfigManager::builtin(),
            Duration::from_secs(5),
            1024 * 1024,
        );
        let state = Arc::new(AppState {
            grader: Grader::new(Sandbox::Process(engine), 2),
            config: GraderConfig::defaults(),
        });
        routes().with_state(state)
    }

    fn post_grade(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_missing_entry_point_report() {
        let request = post_grade(
            "/grade",
            json!({
                "language": "python",
                "sourceCode": "def answer(x):\n    return x\n",
                "testCases": [
                    { "input": 1, "expectedOutput": 1 },
                    { "input": 2, "expectedOutput": 2 },
                    { "input": 3, "expectedOutput": 3 }
                ]
            }),
        );

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(report["totalCases"], json!(3));
        assert_eq!(report["passedCases"], json!(0));
        assert_eq!(report["allPassed"], json!(false));
        for case in report["caseResults"].as_array().unwrap() {
            assert_eq!(case["error"], json!("adapter error: entry point not found"));
            assert!(case.get("actual").is_none());
        }
    }

    #[tokio::test]
    async fn test_text_format() {
        let request = post_grade(
            "/grade?format=text",
            json!({
                "language": "js",
                "sourceCode": "const answer = 1;",
                "testCases": [{ "input": 1, "expectedOutput": 1 }]
            }),
        );

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains("Results: 0/1 test cases passed"));
        assert!(text.contains("Error:    adapter error: entry point not found"));
    }

    #[tokio::test]
    async fn test_large_inputs_reach_validation() {
        // Over axum's 2MB default body limit but within the per-input guard
        let input = "x".repeat(3 * 1024 * 1024);
        let request = post_grade(
            "/grade",
            json!({
                "language": "python",
                "sourceCode": "def answer(x):\n    return x\n",
                "testCases": [{ "input": input, "expectedOutput": 1 }]
            }),
        );

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(report["totalCases"], json!(1));

        // The per-input guard rejects the case, not the request
        let oversized = post_grade(
            "/grade",
            json!({
                "language": "python",
                "sourceCode": "def solution(x):\n    return x\n",
                "testCases": [{ "input": "x".repeat(MAX_TEST_INPUT_BYTES + 1), "expectedOutput": 1 }]
            }),
        );
        let response = app().oneshot(oversized).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            report["caseResults"][0]["error"],
            json!(format!(
                "adapter error: input exceeds maximum size of {} bytes",
                MAX_TEST_INPUT_BYTES
            ))
        );
    }

    #[tokio::test]
    async fn test_rejected_requests_are_bad_requests() {
        let empty = post_grade(
            "/grade",
            json!({ "language": "python", "sourceCode": "", "testCases": [] }),
        );
        let response = app().oneshot(empty).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], json!("at least one test case is required"));

        let too_slow = post_grade(
            "/grade",
            json!({
                "language": "python",
                "sourceCode": "",
                "testCases": [{ "input": 1, "expectedOutput": 1 }],
                "timeLimitMs": 3_600_000
            }),
        );
        let response = app().oneshot(too_slow).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let unknown_language = post_grade(
            "/grade",
            json!({ "language": "cobol", "sourceCode": "", "testCases": [] }),
        );
        let response = app().oneshot(unknown_language).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_exposes_outcomes() {
        let app = app();
        let request = post_grade(
            "/grade",
            json!({
                "language": "cpp",
                "sourceCode": "int main() { return 0; }",
                "testCases": [{ "input": 1, "expectedOutput": 1 }]
            }),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = body_text(response).await;
        assert!(text.contains("grader_submissions_graded_total"));
        assert!(text.contains("grader_case_outcomes_total"));
    }
}
