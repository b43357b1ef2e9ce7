// Local subprocess backend: temp workspace, cleared environment, rlimits,
// namespaces where the kernel allows them, process-group kill otherwise
#[cfg(target_os = "linux")]
use super::namespace::{self, NamespacePlan};
use super::{compile_outcome, compile_timeout, interpret_output, ExecutionEngine, RawOutput};
use crate::adapter::Invocation;
use crate::config::{LanguageConfig, LanguageConfigManager};
use anyhow::{bail, Context, Result};
use grader_common::{ExecutionOutcome, ProcessIsolation};
use std::fmt;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Largest file a run may write into its workspace (compilers included)
const MAX_WORKSPACE_FILE_BYTES: u64 = 64 * 1024 * 1024;
/// How long output readers may keep draining after the child is gone
const READER_GRACE: Duration = Duration::from_millis(500);
const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
/// Environment variable that tags every process of one spawn
const RUN_MARKER_ENV: &str = "GRADER_RUN";
const SWEEP_PASSES: usize = 3;

/// How far a candidate's process tree is confined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Own user, PID, mount, network and IPC namespaces
    Namespaces,
    /// Own process group, plus a sweep for processes that left it
    ProcessGroup,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Namespaces => write!(f, "namespaces"),
            Isolation::ProcessGroup => write!(f, "process-group"),
        }
    }
}

/// Settle the configured isolation against what the host supports
pub fn resolve_isolation(requested: ProcessIsolation) -> Result<Isolation> {
    let isolation = match requested {
        ProcessIsolation::ProcessGroup => Isolation::ProcessGroup,
        ProcessIsolation::Namespaces => {
            if !namespaces_supported() {
                bail!("Namespace isolation was required but this host does not allow unprivileged user namespaces");
            }
            Isolation::Namespaces
        }
        ProcessIsolation::Auto => {
            if namespaces_supported() {
                Isolation::Namespaces
            } else {
                Isolation::ProcessGroup
            }
        }
    };

    match isolation {
        Isolation::Namespaces => info!("Process sandbox confines candidates in namespaces"),
        Isolation::ProcessGroup => warn!(
            "Process sandbox runs without namespaces: candidates share the host network and filesystem, grade trusted code only or use the docker backend"
        ),
    }
    Ok(isolation)
}

fn namespaces_supported() -> bool {
    #[cfg(target_os = "linux")]
    {
        namespace::supported()
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Resource limits applied in the child before exec
#[derive(Debug, Clone, Copy)]
struct Limits {
    cpu_seconds: u64,
    file_bytes: u64,
    address_space_bytes: Option<u64>,
}

impl Limits {
    fn for_deadline(deadline: Duration, address_space_mb: Option<u32>) -> Self {
        let whole = deadline.as_secs() + u64::from(deadline.subsec_nanos() > 0);
        Self {
            cpu_seconds: whole + 1,
            file_bytes: MAX_WORKSPACE_FILE_BYTES,
            address_space_bytes: address_space_mb.map(|mb| u64::from(mb) * 1024 * 1024),
        }
    }
}

/// How a spawned command ended
enum Finish {
    Exited(RawOutput),
    TimedOut,
}

pub struct ProcessEngine {
    languages: LanguageConfigManager,
    compile_time_limit: Duration,
    max_output_bytes: usize,
    isolation: Isolation,
}

impl ProcessEngine {
    pub fn new(
        languages: LanguageConfigManager,
        compile_time_limit: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            languages,
            compile_time_limit,
            max_output_bytes,
            isolation: Isolation::ProcessGroup,
        }
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    async fn execute(&self, invocation: &Invocation, time_limit: Duration) -> Result<ExecutionOutcome> {
        let config = self.languages.get_config(&invocation.language)?;

        // Dropped at the end of this call, which removes every file the run produced
        let workspace = tempfile::Builder::new()
            .prefix("grader-")
            .tempdir()
            .context("Failed to create sandbox workspace")?;

        for file in &invocation.files {
            let path = workspace.path().join(&file.name);
            tokio::fs::write(&path, &file.contents)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        if let Some(compile) = &config.compile {
            let limits = Limits::for_deadline(self.compile_time_limit, None);
            match self
                .spawn(compile, workspace.path(), "", self.compile_time_limit, limits)
                .await?
            {
                Finish::TimedOut => {
                    warn!(language = %invocation.language, "Compilation timed out");
                    return Ok(compile_timeout(self.compile_time_limit));
                }
                Finish::Exited(output) => {
                    if let Some(failure) = compile_outcome(&output) {
                        debug!(language = %invocation.language, "Compilation rejected");
                        return Ok(failure);
                    }
                }
            }
        }

        let limits = Limits::for_deadline(time_limit, address_space_limit(config));
        let start = Instant::now();
        let finish = self
            .spawn(&config.run, workspace.path(), &invocation.stdin, time_limit, limits)
            .await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        Ok(match finish {
            Finish::TimedOut => {
                warn!(
                    language = %invocation.language,
                    timeout_ms = time_limit.as_millis() as u64,
                    execution_time_ms,
                    "Execution timed out, process tree killed"
                );
                ExecutionOutcome::Timeout
            }
            Finish::Exited(output) => {
                debug!(
                    language = %invocation.language,
                    exit_code = ?output.exit_code,
                    execution_time_ms,
                    "Execution finished"
                );
                interpret_output(output.exit_code, &output.stdout, &output.stderr)
            }
        })
    }

    async fn spawn(
        &self,
        argv: &[String],
        workdir: &Path,
        stdin: &str,
        deadline: Duration,
        limits: Limits,
    ) -> Result<Finish> {
        let (program, args) = argv.split_first().context("Empty command")?;
        let program_path = match program.strip_prefix("./") {
            Some(relative) => workdir.join(relative).into_os_string(),
            None => OsString::from(program),
        };

        let marker = uuid::Uuid::new_v4().to_string();
        let mut command = Command::new(&program_path);
        command
            .args(args)
            .current_dir(workdir)
            .env_clear()
            .env(
                "PATH",
                std::env::var_os("PATH").unwrap_or_else(|| OsString::from(FALLBACK_PATH)),
            )
            .env("HOME", workdir)
            .env("LANG", "C.UTF-8")
            .env(RUN_MARKER_ENV, &marker)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        let plan = match self.isolation {
            Isolation::Namespaces => Some(NamespacePlan::for_workspace(workdir)?),
            Isolation::ProcessGroup => None,
        };

        #[cfg(unix)]
        {
            unsafe {
                command.pre_exec(move || {
                    enter_own_group()?;
                    #[cfg(target_os = "linux")]
                    if let Some(plan) = &plan {
                        plan.enter()?;
                    }
                    apply_limits(&limits)
                });
            }
        }
        #[cfg(not(unix))]
        let _ = limits;

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start `{}`", program))?;
        let pid = child.id();
        debug!(program = %program, pid = ?pid, isolation = %self.isolation, "Spawned sandboxed process");

        if let Some(mut pipe) = child.stdin.take() {
            let input = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                // A child that exits without reading its input closes the pipe early
                let _ = pipe.write_all(&input).await;
                let _ = pipe.shutdown().await;
            });
        }

        let stdout = child.stdout.take().context("Child stdout was not captured")?;
        let stderr = child.stderr.take().context("Child stderr was not captured")?;
        let mut stdout_task = tokio::spawn(read_capped(stdout, self.max_output_bytes));
        let mut stderr_task = tokio::spawn(read_capped(stderr, self.max_output_bytes));

        let status = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(status) => Some(status.context("Failed to wait for sandboxed process")?),
            Err(_) => {
                kill_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to reap timed-out process");
                }
                None
            }
        };

        // Background children of the candidate share its group
        kill_group(pid);
        if self.isolation == Isolation::ProcessGroup {
            sweep_escaped(marker).await;
        }

        let Some(status) = status else {
            stdout_task.abort();
            stderr_task.abort();
            return Ok(Finish::TimedOut);
        };

        let (stdout, stderr) = tokio::join!(collect(&mut stdout_task), collect(&mut stderr_task));
        Ok(Finish::Exited(RawOutput {
            exit_code: exit_code(status),
            stdout,
            stderr,
        }))
    }
}

impl ExecutionEngine for ProcessEngine {
    async fn run(&self, invocation: &Invocation, time_limit: Duration) -> ExecutionOutcome {
        match self.execute(invocation, time_limit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(language = %invocation.language, error = %format!("{:#}", e), "Process sandbox failure");
                ExecutionOutcome::InfrastructureError(format!("{:#}", e))
            }
        }
    }
}

fn address_space_limit(config: &LanguageConfig) -> Option<u32> {
    config
        .limit_address_space
        .then_some(config.memory_limit_mb)
}

/// Keep at most `cap` bytes but drain the pipe so the writer never blocks
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }

    kept
}

async fn collect(task: &mut JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(READER_GRACE, &mut *task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => {
            task.abort();
            String::new()
        }
    }
}

fn exit_code(status: ExitStatus) -> Option<i64> {
    if let Some(code) = status.code() {
        return Some(i64::from(code));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + i64::from(signal));
        }
    }
    None
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Kill processes that left the group but still carry this spawn's marker
async fn sweep_escaped(marker: String) {
    let swept = tokio::task::spawn_blocking(move || {
        let needle = format!("{}={}", RUN_MARKER_ENV, marker);
        let mut total = 0;
        for _ in 0..SWEEP_PASSES {
            let killed = kill_marked(needle.as_bytes());
            total += killed;
            if killed == 0 {
                break;
            }
        }
        total
    })
    .await;

    match swept {
        Ok(0) => {}
        Ok(killed) => warn!(killed, "Killed processes that escaped the process group"),
        Err(e) => warn!(error = %e, "Escaped-process sweep failed"),
    }
}

#[cfg(target_os = "linux")]
fn kill_marked(needle: &[u8]) -> usize {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return 0;
    };

    let mut killed = 0;
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<libc::pid_t>().ok())
        else {
            continue;
        };
        // Unreadable for other users' processes; zombies report an empty environment
        let Ok(environ) = std::fs::read(entry.path().join("environ")) else {
            continue;
        };
        if environ.split(|b| *b == 0).any(|var| var == needle) {
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
            killed += 1;
        }
    }
    killed
}

#[cfg(not(target_os = "linux"))]
fn kill_marked(_needle: &[u8]) -> usize {
    0
}

#[cfg(unix)]
fn enter_own_group() -> std::io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Runs in the forked child between fork and exec.
/// The CPU soft limit raises SIGXCPU (reported as a timeout); the hard limit a
/// second later is the SIGKILL backstop for programs that catch it.
#[cfg(unix)]
fn apply_limits(limits: &Limits) -> std::io::Result<()> {
    unsafe {
        let cpu = libc::rlimit {
            rlim_cur: limits.cpu_seconds as libc::rlim_t,
            rlim_max: (limits.cpu_seconds + 1) as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let fsize = libc::rlimit {
            rlim_cur: limits.file_bytes as libc::rlim_t,
            rlim_max: limits.file_bytes as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_FSIZE, &fsize) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let core = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::setrlimit(libc::RLIMIT_CORE, &core) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        if let Some(bytes) = limits.address_space_bytes {
            let address_space = libc::rlimit {
                rlim_cur: bytes as libc::rlim_t,
                rlim_max: bytes as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &address_space) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }
    Ok(())
}
