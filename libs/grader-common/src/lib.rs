pub mod config;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{ConfigError, GraderConfig, ProcessIsolation, SandboxBackend};
pub use types::{
    CaseResult, ExecutionOutcome, GradingRequest, Language, RequestRejection, Submission,
    SubmissionReport, TestCase, UnknownLanguage, MAX_REQUEST_BODY_BYTES, MAX_TEST_INPUT_BYTES,
};
