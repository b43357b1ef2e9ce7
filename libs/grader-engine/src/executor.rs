/// Test Run Orchestrator
///
/// **Responsibility:**
/// Grade one submission against its test cases.
///
/// **Architecture:**
/// 1. Resolve the language adapter and discover the entry point (adapter/)
/// 2. Shape each case's input and run it in the sandbox (sandbox/)
/// 3. Score each outcome (evaluator.rs) and aggregate the report
///
/// This module is the glue layer. It knows nothing about:
/// - How code executes (sandbox's job)
/// - How values are compared (comparator's job)
///
/// Cases run concurrently up to `max_concurrent_cases`, results keep input order,
/// and nothing survives between `grade_submission` calls.
use crate::adapter::{adapter_for, EntryPoint, LanguageAdapter};
use crate::evaluator;
use crate::sandbox::ExecutionEngine;
use futures_util::stream::{self, StreamExt};
use grader_common::{CaseResult, ExecutionOutcome, Submission, SubmissionReport, TestCase};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub struct Grader<E> {
    engine: E,
    max_concurrent_cases: usize,
}

impl<E: ExecutionEngine> Grader<E> {
    pub fn new(engine: E, max_concurrent_cases: usize) -> Self {
        Self {
            engine,
            max_concurrent_cases: max_concurrent_cases.max(1),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Grade every case; failures are recorded per case, never raised
    #[instrument(
        skip_all,
        fields(
            language = %submission.language,
            test_count = test_cases.len(),
            time_limit_ms = time_limit_ms
        )
    )]
    pub async fn grade_submission(
        &self,
        submission: &Submission,
        test_cases: &[TestCase],
        time_limit_ms: u64,
    ) -> SubmissionReport {
        let start = Instant::now();
        let adapter = adapter_for(submission.language);

        let entry_point = match adapter.extract_entry_point(&submission.source_code) {
            Ok(entry_point) => entry_point,
            Err(e) => {
                warn!(error = %e, "Entry point discovery failed, no case will run");
                let message = e.to_string();
                let results = test_cases
                    .iter()
                    .enumerate()
                    .map(|(index, case)| evaluator::rejected_case(index, case, &message))
                    .collect();
                return SubmissionReport::from_case_results(results);
            }
        };

        debug!(
            parameters = entry_point.parameters.len(),
            "Entry point discovered"
        );

        let pending: Vec<_> = test_cases
            .iter()
            .enumerate()
            .map(|(index, case)| self.grade_case(adapter, &entry_point, index, case, time_limit_ms))
            .collect();
        let results: Vec<CaseResult> = stream::iter(pending)
            .buffered(self.max_concurrent_cases)
            .collect()
            .await;

        let report = SubmissionReport::from_case_results(results);
        info!(
            passed = report.passed_cases,
            total = report.total_cases,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Submission graded"
        );
        report
    }

    async fn grade_case(
        &self,
        adapter: &dyn LanguageAdapter,
        entry_point: &EntryPoint,
        index: usize,
        test_case: &TestCase,
        time_limit_ms: u64,
    ) -> CaseResult {
        let start = Instant::now();

        let outcome = match adapter.invoke(entry_point, &test_case.input) {
            Ok(invocation) => {
                self.engine
                    .run(&invocation, Duration::from_millis(time_limit_ms))
                    .await
            }
            Err(e) => ExecutionOutcome::AdapterError(e.to_string()),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(index, outcome = outcome.kind(), duration_ms, "Case finished");

        evaluator::evaluate_case(index, test_case, outcome, duration_ms, time_limit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Invocation;
    use grader_common::Language;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted engine: reads the JSON argument list from stdin and
    /// answers without starting any process
    #[derive(Default)]
    struct MockEngine {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ExecutionEngine for MockEngine {
        async fn run(&self, invocation: &Invocation, _time_limit: Duration) -> ExecutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let args: Vec<Value> = serde_json::from_str(&invocation.stdin).unwrap_or_default();
            let first = args.first().cloned().unwrap_or(Value::Null);

            // Earlier cases sleep longer so completion order differs from input order
            if let Some(n) = first.as_u64() {
                tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(n * 10))).await;
            }

            let outcome = match first {
                Value::String(ref s) if s == "boom" => {
                    ExecutionOutcome::RuntimeError("Error: boom".to_string())
                }
                Value::String(ref s) if s == "hang" => ExecutionOutcome::Timeout,
                Value::String(ref s) if s == "down" => {
                    ExecutionOutcome::InfrastructureError("Failed to start `node`".to_string())
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => ExecutionOutcome::Success(json!(f * 2.0)),
                    None => ExecutionOutcome::Success(Value::Null),
                },
                other => ExecutionOutcome::Success(other),
            };

            self.running.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    fn doubler() -> Submission {
        Submission {
            language: Language::JavaScript,
            source_code: "function solution(n) { return n * 2; }".to_string(),
        }
    }

    fn without_durations(mut report: SubmissionReport) -> SubmissionReport {
        for result in &mut report.case_results {
            result.duration_ms = 0;
        }
        report
    }

    #[tokio::test]
    async fn test_doubling_scenario_passes_with_string_expectation() {
        let grader = Grader::new(MockEngine::default(), 4);
        let cases = vec![TestCase::new(json!(5), json!("10"))];

        let report = grader.grade_submission(&doubler(), &cases, 5000).await;

        assert!(report.all_passed);
        assert_eq!(report.case_results[0].actual, Some(json!(10.0)));
    }

    #[tokio::test]
    async fn test_missing_entry_point_fails_every_case_without_running() {
        let grader = Grader::new(MockEngine::default(), 4);
        let submission = Submission {
            language: Language::Python,
            source_code: "def answer(x):\n    return x\n".to_string(),
        };
        let cases = vec![
            TestCase::new(json!(1), json!(1)),
            TestCase::new(json!(2), json!(2)),
            TestCase::new(json!(3), json!(3)),
        ];

        let report = grader.grade_submission(&submission, &cases, 5000).await;

        assert_eq!(report.total_cases, 3);
        assert_eq!(report.passed_cases, 0);
        assert!(!report.all_passed);
        for result in &report.case_results {
            assert_eq!(
                result.error.as_deref(),
                Some("adapter error: entry point not found")
            );
            assert_eq!(result.actual, None);
        }
        assert_eq!(grader.engine().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_faulty_cases_do_not_affect_others() {
        let grader = Grader::new(MockEngine::default(), 2);
        let cases = vec![
            TestCase::new(json!(1), json!(2)),
            TestCase::new(json!("boom"), json!(0)),
            TestCase::new(json!("hang"), json!(0)),
            TestCase::new(json!("down"), json!(0)),
            TestCase::new(json!(3), json!(6)),
        ];

        let report = grader.grade_submission(&doubler(), &cases, 250).await;

        assert_eq!(report.passed_cases, 2);
        assert!(report.case_results[0].passed);
        assert_eq!(
            report.case_results[1].error.as_deref(),
            Some("runtime error: Error: boom")
        );
        assert_eq!(
            report.case_results[2].error.as_deref(),
            Some("timeout: exceeded 250 ms")
        );
        assert_eq!(
            report.case_results[3].error.as_deref(),
            Some("infrastructure error: Failed to start `node`")
        );
        assert!(report.case_results[4].passed);
    }

    #[tokio::test]
    async fn test_shaping_failure_is_case_level() {
        let grader = Grader::new(MockEngine::default(), 4);
        let submission = Submission {
            language: Language::JavaScript,
            source_code: "function solution(a, b) { return a + b; }".to_string(),
        };
        let cases = vec![
            TestCase::new(json!([1, 2, 3]), json!(6)),
            TestCase::new(json!([4, 5]), json!(8)),
        ];

        let report = grader.grade_submission(&submission, &cases, 5000).await;

        assert_eq!(
            report.case_results[0].error.as_deref(),
            Some("adapter error: expected an array of 2 arguments, got an array of 3 elements")
        );
        assert!(report.case_results[1].passed);
        assert_eq!(grader.engine().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_results_keep_input_order_under_concurrency() {
        let grader = Grader::new(MockEngine::default(), 4);
        let cases: Vec<TestCase> = (0..5)
            .map(|n| TestCase::new(json!(n), json!(n * 2)))
            .collect();

        let report = grader.grade_submission(&doubler(), &cases, 5000).await;

        let indices: Vec<usize> = report.case_results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(report.all_passed);

        let peak = grader.engine().peak.load(Ordering::SeqCst);
        assert!(peak > 1 && peak <= 4, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn test_single_slot_runs_sequentially() {
        let grader = Grader::new(MockEngine::default(), 0);
        let cases: Vec<TestCase> = (0..3)
            .map(|n| TestCase::new(json!(n), json!(n * 2)))
            .collect();

        let report = grader.grade_submission(&doubler(), &cases, 5000).await;

        assert!(report.all_passed);
        assert_eq!(grader.engine().peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_grading_is_deterministic() {
        let grader = Grader::new(MockEngine::default(), 3);
        let cases = vec![
            TestCase::new(json!(2), json!(4)),
            TestCase::new(json!("boom"), json!(1)),
            TestCase::new(json!(7), json!(13)),
        ];

        let first = grader.grade_submission(&doubler(), &cases, 1000).await;
        let second = grader.grade_submission(&doubler(), &cases, 1000).await;

        assert_eq!(without_durations(first.clone()), without_durations(second));
        assert_eq!(first.total_cases, 3);
        assert_eq!(first.passed_cases, 1);
        assert_eq!(first.failed_cases(), 2);
    }
}
