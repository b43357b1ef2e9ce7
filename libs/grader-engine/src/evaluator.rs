/// Case Evaluator - Outcome to CaseResult
///
/// **Core Responsibility:**
/// Turn one `ExecutionOutcome` into a `CaseResult`.
///
/// **Critical Properties:**
/// - Knows nothing about processes or containers
/// - Knows nothing about language runtimes
/// - Pure function: (case, outcome) → result
///
/// **Rules:**
/// - `Success(value)`: `actual = value`, `passed = equal(value, expected)`
/// - Anything else: not passed, no `actual`, `error` names the outcome kind
use crate::comparator;
use grader_common::{CaseResult, ExecutionOutcome, TestCase};

/// Evaluate a single executed case
pub fn evaluate_case(
    index: usize,
    test_case: &TestCase,
    outcome: ExecutionOutcome,
    duration_ms: u64,
    time_limit_ms: u64,
) -> CaseResult {
    let (actual, passed, error) = match outcome {
        ExecutionOutcome::Success(value) => {
            let passed = comparator::equal(&value, &test_case.expected_output);
            (Some(value), passed, None)
        }
        other => (None, false, Some(error_message(&other, time_limit_ms))),
    };

    CaseResult {
        index,
        input: test_case.input.clone(),
        expected: test_case.expected_output.clone(),
        actual,
        passed,
        error,
        duration_ms,
    }
}

/// A case that never ran because the submission was rejected up front
pub fn rejected_case(index: usize, test_case: &TestCase, message: &str) -> CaseResult {
    CaseResult {
        index,
        input: test_case.input.clone(),
        expected: test_case.expected_output.clone(),
        actual: None,
        passed: false,
        error: Some(format!("adapter error: {}", message)),
        duration_ms: 0,
    }
}

/// Stable label for a finished case (metrics, summaries)
pub fn case_status(result: &CaseResult) -> &'static str {
    if result.passed {
        return "passed";
    }
    if result.actual.is_some() {
        return "wrong_answer";
    }
    match result.error.as_deref() {
        Some(e) if e.starts_with("runtime error:") => "runtime_error",
        Some(e) if e.starts_with("timeout:") => "timeout",
        Some(e) if e.starts_with("infrastructure error:") => "infrastructure_error",
        _ => "adapter_error",
    }
}

fn error_message(outcome: &ExecutionOutcome, time_limit_ms: u64) -> String {
    match outcome {
        ExecutionOutcome::RuntimeError(message) => format!("runtime error: {}", message),
        ExecutionOutcome::Timeout => format!("timeout: exceeded {} ms", time_limit_ms),
        ExecutionOutcome::AdapterError(message) => format!("adapter error: {}", message),
        ExecutionOutcome::InfrastructureError(message) => {
            format!("infrastructure error: {}", message)
        }
        ExecutionOutcome::Success(_) => String::new(),
    }
}
