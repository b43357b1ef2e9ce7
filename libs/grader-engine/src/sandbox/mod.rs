/// Execution Sandbox - Abstraction for Running One Invocation
///
/// **Core Responsibility:**
/// Materialise an adapter's harness in a fresh workspace, compile it when the
/// language needs it, run it under a deadline and turn the raw exit status and
/// output into an `ExecutionOutcome`.
///
/// **Boundary:**
/// - The sandbox knows HOW to execute (local process or Docker container)
/// - It does NOT compare values or build case results
/// - Every plumbing failure becomes `InfrastructureError`, never `RuntimeError`
pub mod docker;
#[cfg(target_os = "linux")]
mod namespace;
pub mod process;

use crate::adapter::{Invocation, ERROR_MARKER, RESULT_MARKER};
use crate::config::LanguageConfigManager;
use anyhow::Result;
use grader_common::{ExecutionOutcome, GraderConfig, SandboxBackend};
use std::future::Future;
use std::time::Duration;

pub use docker::DockerEngine;
pub use process::{Isolation, ProcessEngine};

/// Exit status a shell reports for SIGXCPU (128 + 24 on Linux)
pub const CPU_LIMIT_EXIT: i64 = 152;
/// SIGKILL, which is what the memory cgroup or the hard RLIMIT_CPU delivers
pub const KILLED_EXIT: i64 = 137;
pub const SEGFAULT_EXIT: i64 = 139;

const MAX_MESSAGE_CHARS: usize = 500;

/// One execution backend.
///
/// `run` never fails: every problem is folded into the returned outcome.
pub trait ExecutionEngine: Send + Sync {
    fn run(
        &self,
        invocation: &Invocation,
        time_limit: Duration,
    ) -> impl Future<Output = ExecutionOutcome> + Send;
}

/// The configured backend
pub enum Sandbox {
    Process(ProcessEngine),
    Docker(DockerEngine),
}

impl Sandbox {
    pub fn from_config(config: &GraderConfig, languages: LanguageConfigManager) -> Result<Self> {
        let compile_time_limit = Duration::from_millis(config.compile_time_limit_ms);

        Ok(match config.sandbox_backend {
            SandboxBackend::Process => Sandbox::Process(
                ProcessEngine::new(languages, compile_time_limit, config.max_output_bytes)
                    .with_isolation(process::resolve_isolation(config.process_isolation)?),
            ),
            SandboxBackend::Docker => Sandbox::Docker(DockerEngine::new_with_config(
                languages,
                compile_time_limit,
                config.max_output_bytes,
            )?),
        })
    }

    pub fn backend(&self) -> SandboxBackend {
        match self {
            Sandbox::Process(_) => SandboxBackend::Process,
            Sandbox::Docker(_) => SandboxBackend::Docker,
        }
    }
}

impl ExecutionEngine for Sandbox {
    async fn run(&self, invocation: &Invocation, time_limit: Duration) -> ExecutionOutcome {
        match self {
            Sandbox::Process(engine) => engine.run(invocation, time_limit).await,
            Sandbox::Docker(engine) => engine.run(invocation, time_limit).await,
        }
    }
}

/// Captured result of one command inside a workspace
#[derive(Debug, Clone, Default)]
pub(crate) struct RawOutput {
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
}

/// Map a finished run onto an outcome
pub fn interpret_output(exit_code: Option<i64>, stdout: &str, stderr: &str) -> ExecutionOutcome {
    let Some(code) = exit_code else {
        return ExecutionOutcome::InfrastructureError(
            "sandbox did not report an exit status".to_string(),
        );
    };

    match code {
        0 => match result_payload(stdout) {
            Some(payload) => match serde_json::from_str(payload) {
                Ok(value) => ExecutionOutcome::Success(value),
                Err(e) => ExecutionOutcome::RuntimeError(format!(
                    "result could not be decoded: {}",
                    e
                )),
            },
            None => ExecutionOutcome::RuntimeError(
                "program exited without producing a result".to_string(),
            ),
        },
        CPU_LIMIT_EXIT => ExecutionOutcome::Timeout,
        KILLED_EXIT => ExecutionOutcome::RuntimeError(
            "killed: likely exceeded the memory limit".to_string(),
        ),
        SEGFAULT_EXIT => ExecutionOutcome::RuntimeError("segmentation fault".to_string()),
        _ => ExecutionOutcome::RuntimeError(
            failure_message(stderr).unwrap_or_else(|| format!("exited with code {}", code)),
        ),
    }
}

/// `None` when the compiler succeeded
pub(crate) fn compile_outcome(output: &RawOutput) -> Option<ExecutionOutcome> {
    if output.exit_code == Some(0) {
        return None;
    }

    let combined = format!("{}\n{}", output.stderr, output.stdout);
    let headline = combined
        .lines()
        .map(str::trim)
        .find(|line| line.contains("error"))
        .or_else(|| combined.lines().map(str::trim).find(|line| !line.is_empty()))
        .map(truncate)
        .unwrap_or_else(|| match output.exit_code {
            Some(code) => format!("compiler exited with code {}", code),
            None => "compiler did not report an exit status".to_string(),
        });

    Some(ExecutionOutcome::RuntimeError(format!(
        "compilation failed: {}",
        headline
    )))
}

pub(crate) fn compile_timeout(limit: Duration) -> ExecutionOutcome {
    ExecutionOutcome::RuntimeError(format!(
        "compilation exceeded {} ms",
        limit.as_millis()
    ))
}

/// The harness prints its result last, so the last marker line wins
fn result_payload(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim_end_matches('\r').strip_prefix(RESULT_MARKER))
}

fn failure_message(stderr: &str) -> Option<String> {
    let marked = stderr
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(ERROR_MARKER))
        .map(str::trim);

    marked
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .filter(|message| !message.is_empty())
        .map(truncate)
}

fn truncate(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => format!("{}…", &message[..cut]),
        None => message.to_string(),
    }
}
