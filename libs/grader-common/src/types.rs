use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum accepted source size, checked before anything is executed
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
/// Maximum accepted size of one serialized test input
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Largest HTTP request body the API will buffer; room for several full-size inputs
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024; // 64MB

/// Strongly-typed language enum
/// Wire names are the lowercase tags used by the grading request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "js")]
    JavaScript,
    #[serde(alias = "py")]
    Python,
    Java,
    #[serde(alias = "c++")]
    Cpp,
}

impl Language {
    /// Returns all language variants
    /// This is the single source of truth for supported languages
    pub fn all_variants() -> &'static [Language] {
        &[
            Language::JavaScript,
            Language::Python,
            Language::Java,
            Language::Cpp,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown language '{0}'")]
pub struct UnknownLanguage(pub String);

/// Language tags are case-insensitive and accept the short aliases
impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::Python => write!(f, "python"),
            Language::Java => write!(f, "java"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

/// Candidate solution (immutable once accepted for a run)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub language: Language,
    pub source_code: String,
}

/// Test Case Definition (Immutable Input)
/// Position in the owning sequence is the case index; order drives reporting only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: Value,
    pub expected_output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TestCase {
    pub fn new(input: Value, expected_output: Value) -> Self {
        Self {
            input,
            expected_output,
            description: None,
        }
    }
}

/// Grading request as received from the problem/authoring side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    pub language: Language,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
}

impl GradingRequest {
    pub fn submission(&self) -> Submission {
        Submission {
            language: self.language,
            source_code: self.source_code.clone(),
        }
    }

    /// Resolve the per-case deadline, falling back to the configured default
    pub fn effective_time_limit_ms(&self, default_ms: u64) -> u64 {
        self.time_limit_ms.unwrap_or(default_ms)
    }

    /// Reject requests that must never reach a sandbox
    pub fn validate(&self, max_time_limit_ms: u64) -> Result<(), RequestRejection> {
        if self.test_cases.is_empty() {
            return Err(RequestRejection::NoTestCases);
        }
        if self.source_code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(RequestRejection::SourceTooLarge(self.source_code.len()));
        }
        if let Some(limit) = self.time_limit_ms {
            if limit == 0 || limit > max_time_limit_ms {
                return Err(RequestRejection::TimeLimitOutOfRange {
                    requested: limit,
                    max: max_time_limit_ms,
                });
            }
        }
        Ok(())
    }
}

/// Why a grading request was refused before grading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRejection {
    NoTestCases,
    SourceTooLarge(usize),
    TimeLimitOutOfRange { requested: u64, max: u64 },
}

impl RequestRejection {
    /// Stable label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            RequestRejection::NoTestCases => "no_test_cases",
            RequestRejection::SourceTooLarge(_) => "source_too_large",
            RequestRejection::TimeLimitOutOfRange { .. } => "time_limit_out_of_range",
        }
    }
}

impl fmt::Display for RequestRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestRejection::NoTestCases => write!(f, "at least one test case is required"),
            RequestRejection::SourceTooLarge(size) => write!(
                f,
                "source code is {} bytes, maximum is {} bytes",
                size, MAX_SOURCE_CODE_BYTES
            ),
            RequestRejection::TimeLimitOutOfRange { requested, max } => write!(
                f,
                "time limit {}ms is outside the allowed range 1..={}ms",
                requested, max
            ),
        }
    }
}

impl std::error::Error for RequestRejection {}

/// Outcome of one sandboxed invocation
/// Produced once per (submission, test case) and never mutated
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(Value),
    RuntimeError(String),
    Timeout,
    AdapterError(String),
    InfrastructureError(String),
}

impl ExecutionOutcome {
    /// Stable outcome kind label (logs and metrics)
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionOutcome::Success(_) => "success",
            ExecutionOutcome::RuntimeError(_) => "runtime_error",
            ExecutionOutcome::Timeout => "timeout",
            ExecutionOutcome::AdapterError(_) => "adapter_error",
            ExecutionOutcome::InfrastructureError(_) => "infrastructure_error",
        }
    }
}

/// Per-case result
/// `actual` is present only when the candidate returned a value;
/// `error` is present only when it did not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub index: usize,
    pub input: Value,
    pub expected: Value,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub actual: Option<Value>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A present `actual: null` is a returned null, not a missing value
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Submission Report
/// Built once per grading run; counts are always derived from `case_results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub total_cases: usize,
    pub passed_cases: usize,
    pub all_passed: bool,
    pub case_results: Vec<CaseResult>,
}

impl SubmissionReport {
    pub fn from_case_results(case_results: Vec<CaseResult>) -> Self {
        let total_cases = case_results.len();
        let passed_cases = case_results.iter().filter(|r| r.passed).count();

        Self {
            total_cases,
            passed_cases,
            all_passed: passed_cases == total_cases,
            case_results,
        }
    }

    pub fn failed_cases(&self) -> usize {
        self.total_cases - self.passed_cases
    }
}
