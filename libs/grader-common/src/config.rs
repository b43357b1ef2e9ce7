use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which sandbox backend executes invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBackend {
    /// Local subprocess with rlimits, one temp workspace per invocation
    Process,
    /// One Docker container per invocation
    Docker,
}

impl FromStr for SandboxBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" => Ok(SandboxBackend::Process),
            "docker" => Ok(SandboxBackend::Docker),
            other => Err(format!(
                "unknown sandbox backend '{}' (expected 'process' or 'docker')",
                other
            )),
        }
    }
}

impl fmt::Display for SandboxBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxBackend::Process => write!(f, "process"),
            SandboxBackend::Docker => write!(f, "docker"),
        }
    }
}

/// How the process backend confines a candidate's process tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessIsolation {
    /// Namespaces when the kernel allows them, otherwise the process group
    Auto,
    /// Namespaces or refuse to start
    Namespaces,
    /// Process group only; suitable for trusted code
    ProcessGroup,
}

impl FromStr for ProcessIsolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ProcessIsolation::Auto),
            "namespaces" => Ok(ProcessIsolation::Namespaces),
            "process-group" | "process_group" | "none" => Ok(ProcessIsolation::ProcessGroup),
            other => Err(format!(
                "unknown process isolation '{}' (expected 'auto', 'namespaces' or 'process-group')",
                other
            )),
        }
    }
}

impl fmt::Display for ProcessIsolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessIsolation::Auto => write!(f, "auto"),
            ProcessIsolation::Namespaces => write!(f, "namespaces"),
            ProcessIsolation::ProcessGroup => write!(f, "process-group"),
        }
    }
}

/// Grader configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub time_limit_ms: u64,
    pub max_time_limit_ms: u64,
    pub max_concurrent_cases: usize,
    pub compile_time_limit_ms: u64,
    pub sandbox_backend: SandboxBackend,
    pub process_isolation: ProcessIsolation,
    pub max_output_bytes: usize,
    pub language_config_path: String,
    pub bind_addr: String,
}

impl GraderConfig {
    /// Read overrides from the environment; a set but unparsable value is an error
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::defaults();

        Ok(Self {
            time_limit_ms: env_parse("GRADER_TIME_LIMIT_MS")?.unwrap_or(defaults.time_limit_ms),
            max_time_limit_ms: env_parse("GRADER_MAX_TIME_LIMIT_MS")?
                .unwrap_or(defaults.max_time_limit_ms),
            max_concurrent_cases: env_parse::<usize>("GRADER_MAX_CONCURRENT_CASES")?
                .unwrap_or(defaults.max_concurrent_cases)
                .max(1),
            compile_time_limit_ms: env_parse("GRADER_COMPILE_TIME_LIMIT_MS")?
                .unwrap_or(defaults.compile_time_limit_ms),
            sandbox_backend: env_parse("GRADER_SANDBOX")?.unwrap_or(defaults.sandbox_backend),
            process_isolation: env_parse("GRADER_PROCESS_ISOLATION")?
                .unwrap_or(defaults.process_isolation),
            max_output_bytes: env_parse("GRADER_MAX_OUTPUT_BYTES")?
                .unwrap_or(defaults.max_output_bytes),
            language_config_path: env::var("LANGUAGE_CONFIG_PATH")
                .unwrap_or(defaults.language_config_path),
            bind_addr: env::var("GRADER_BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    /// Built-in values, independent of the environment
    pub fn defaults() -> Self {
        Self {
            time_limit_ms: 5000,
            max_time_limit_ms: 30000,
            max_concurrent_cases: 4,
            compile_time_limit_ms: 15000,
            sandbox_backend: SandboxBackend::Process,
            process_isolation: ProcessIsolation::Auto,
            max_output_bytes: 1024 * 1024,
            language_config_path: "config/languages.json".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Ok(raw) = env::var(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
