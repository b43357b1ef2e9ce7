/// Docker-based execution engine
///
/// **Docker Execution Rules:**
/// 1. Pulls the language image if it is not cached
/// 2. Creates one container per invocation:
///    - Network disabled
///    - CPU/memory limits from the language configuration
/// 3. Writes harness files and the stdin payload through base64 exec
/// 4. Compiles (when configured) and runs via exec, capturing stdout/stderr
/// 5. Kills the container on timeout
/// 6. Removes the container before returning; a drop guard covers cancellation
/// 7. Bounds every daemon call, so a stalled daemon is an infrastructure error
use super::{compile_outcome, compile_timeout, interpret_output, ExecutionEngine, RawOutput};
use crate::adapter::Invocation;
use crate::config::{LanguageConfig, LanguageConfigManager};
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use grader_common::ExecutionOutcome;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const WORKDIR: &str = "/code";
const STDIN_FILE: &str = "input.json";
/// Raw bytes per write exec; encodes to 64KB of base64, well under one argv entry's limit
const WRITE_CHUNK_BYTES: usize = 48 * 1024;
const PIDS_LIMIT: i64 = 256;
/// Deadline for one daemon call outside the candidate's own run
const DAEMON_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Container cleanup guard - removes the container if the invocation is dropped midway
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: &Docker, container_id: String) -> Self {
        Self {
            docker: docker.clone(),
            container_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Cannot await in Drop; hand the removal to the runtime if there still is one
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();

        handle.spawn(async move {
            let removal = bounded(DAEMON_CALL_TIMEOUT, "Removing container", async {
                docker
                    .remove_container(&container_id, Some(force_remove()))
                    .await
                    .context("Failed to remove container")
            });
            if let Err(e) = removal.await {
                warn!(container_id = %container_id, error = %format!("{:#}", e), "Failed to clean up container");
            }
        });
    }
}

fn force_remove() -> RemoveContainerOptions {
    RemoveContainerOptions {
        force: true,
        ..Default::default()
    }
}

pub struct DockerEngine {
    docker: Docker,
    languages: LanguageConfigManager,
    compile_time_limit: Duration,
    max_output_bytes: usize,
    call_timeout: Duration,
    pull_timeout: Duration,
}

impl DockerEngine {
    /// Connect to the local daemon
    pub fn new_with_config(
        languages: LanguageConfigManager,
        compile_time_limit: Duration,
        max_output_bytes: usize,
    ) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;

        Ok(Self::with_client(docker, languages, compile_time_limit, max_output_bytes))
    }

    fn with_client(
        docker: Docker,
        languages: LanguageConfigManager,
        compile_time_limit: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            docker,
            languages,
            compile_time_limit,
            max_output_bytes,
            call_timeout: DAEMON_CALL_TIMEOUT,
            pull_timeout: IMAGE_PULL_TIMEOUT,
        }
    }

    /// Override the daemon call and image pull deadlines
    pub fn with_timeouts(mut self, call_timeout: Duration, pull_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.pull_timeout = pull_timeout;
        self
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<()> {
        let cached = bounded(self.call_timeout, "Inspecting image", async {
            Ok::<_, anyhow::Error>(self.docker.inspect_image(image).await.is_ok())
        })
        .await?;
        if cached {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        bounded(self.pull_timeout, "Pulling image", async {
            let options = Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            });
            let mut stream = self.docker.create_image(options, None, None);
            while let Some(result) = stream.next().await {
                result.context("Failed to pull Docker image")?;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await?;

        info!(image = %image, "Image pulled");
        Ok(())
    }

    async fn execute(&self, invocation: &Invocation, time_limit: Duration) -> Result<ExecutionOutcome> {
        let config = self.languages.get_config(&invocation.language)?;

        self.ensure_image(&config.image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", config.image))?;

        let container_name = format!("grader-{}", uuid::Uuid::new_v4());
        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(WORKDIR.to_string()),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(config.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((f64::from(config.cpu_limit) * 1_000_000_000.0) as i64),
                pids_limit: Some(PIDS_LIMIT),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = bounded(self.call_timeout, "Creating container", async {
            self.docker
                .create_container(
                    Some(CreateContainerOptions {
                        name: container_name.as_str(),
                        platform: None,
                    }),
                    container_config,
                )
                .await
                .context("Failed to create Docker container")
        })
        .await?;
        let container_id = container.id;
        let mut guard = ContainerGuard::new(&self.docker, container_id.clone());

        let outcome = self
            .run_in_container(&container_id, config, invocation, time_limit)
            .await;

        guard.disarm();
        let removal = bounded(self.call_timeout, "Removing container", async {
            self.docker
                .remove_container(&container_id, Some(force_remove()))
                .await
                .context("Failed to remove container")
        })
        .await;
        match removal {
            Ok(()) => debug!(container_id = %container_id, "Container removed"),
            Err(e) => {
                warn!(container_id = %container_id, error = %format!("{:#}", e), "Failed to remove container")
            }
        }

        outcome
    }

    async fn run_in_container(
        &self,
        container_id: &str,
        config: &LanguageConfig,
        invocation: &Invocation,
        time_limit: Duration,
    ) -> Result<ExecutionOutcome> {
        bounded(self.call_timeout, "Starting container", async {
            self.docker
                .start_container(container_id, None::<StartContainerOptions<String>>)
                .await
                .context("Failed to start Docker container")
        })
        .await?;

        for file in &invocation.files {
            self.write_file(container_id, &file.name, file.contents.as_bytes())
                .await?;
        }
        self.write_file(container_id, STDIN_FILE, invocation.stdin.as_bytes())
            .await?;

        if let Some(compile) = &config.compile {
            let script = shell_command(compile);
            match tokio::time::timeout(self.compile_time_limit, self.exec(container_id, script)).await
            {
                Err(_) => {
                    self.kill(container_id).await;
                    warn!(language = %invocation.language, "Compilation timed out");
                    return Ok(compile_timeout(self.compile_time_limit));
                }
                Ok(output) => {
                    if let Some(failure) = compile_outcome(&output?) {
                        debug!(language = %invocation.language, "Compilation rejected");
                        return Ok(failure);
                    }
                }
            }
        }

        let script = format!("{} < {}", shell_command(&config.run), STDIN_FILE);
        let start = Instant::now();
        let result = tokio::time::timeout(time_limit, self.exec(container_id, script)).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Err(_) => {
                self.kill(container_id).await;
                warn!(
                    language = %invocation.language,
                    timeout_ms = time_limit.as_millis() as u64,
                    execution_time_ms,
                    "Execution timed out, container killed"
                );
                Ok(ExecutionOutcome::Timeout)
            }
            Ok(output) => {
                let output = output?;
                debug!(
                    language = %invocation.language,
                    exit_code = ?output.exit_code,
                    execution_time_ms,
                    "Execution finished"
                );
                Ok(interpret_output(output.exit_code, &output.stdout, &output.stderr))
            }
        }
    }

    /// Write a file into the workspace in base64 chunks
    async fn write_file(&self, container_id: &str, name: &str, contents: &[u8]) -> Result<()> {
        let target = shell_quote(&format!("{}/{}", WORKDIR, name));

        if contents.is_empty() {
            let output = bounded(
                self.call_timeout,
                "Writing workspace file",
                self.exec(container_id, format!(": > {}", target)),
            )
            .await?;
            if output.exit_code != Some(0) {
                bail!("Failed to write {} to container", name);
            }
            return Ok(());
        }

        for (i, chunk) in contents.chunks(WRITE_CHUNK_BYTES).enumerate() {
            let redirect = if i == 0 { ">" } else { ">>" };
            let script = format!(
                "printf '%s' '{}' | base64 -d {} {}",
                general_purpose::STANDARD.encode(chunk),
                redirect,
                target
            );
            let output = bounded(
                self.call_timeout,
                "Writing workspace file",
                self.exec(container_id, script),
            )
            .await?;
            if output.exit_code != Some(0) {
                bail!(
                    "Failed to write {} to container: {}",
                    name,
                    output.stderr.trim()
                );
            }
        }

        Ok(())
    }

    /// Run `sh -c script` in the workspace and collect its output
    async fn exec(&self, container_id: &str, script: String) -> Result<RawOutput> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), script]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(WORKDIR.to_string()),
                    ..Default::default()
                },
            )
            .await
            .context("Failed to create exec")?;

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        let started = self
            .docker
            .start_exec(&exec.id, Some(start_config))
            .await
            .context("Failed to start exec")?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(message) = output.next().await {
                match message.context("Failed to read exec output")? {
                    LogOutput::StdOut { message } => {
                        append_capped(&mut stdout, &message, self.max_output_bytes)
                    }
                    LogOutput::StdErr { message } => {
                        append_capped(&mut stderr, &message, self.max_output_bytes)
                    }
                    _ => {}
                }
            }
        } else {
            bail!("Failed to attach to exec");
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .context("Failed to inspect exec")?;

        Ok(RawOutput {
            exit_code: inspect.exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn kill(&self, container_id: &str) {
        let killed = bounded(self.call_timeout, "Killing container", async {
            self.docker
                .kill_container(container_id, None::<KillContainerOptions<String>>)
                .await
                .context("Failed to kill container")
        })
        .await;
        if let Err(e) = killed {
            warn!(container_id = %container_id, error = %format!("{:#}", e), "Failed to kill timed-out container");
        }
    }
}

impl ExecutionEngine for DockerEngine {
    async fn run(&self, invocation: &Invocation, time_limit: Duration) -> ExecutionOutcome {
        match self.execute(invocation, time_limit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(language = %invocation.language, error = %format!("{:#}", e), "Docker sandbox failure");
                ExecutionOutcome::InfrastructureError(format!("{:#}", e))
            }
        }
    }
}

/// Run one daemon interaction under a deadline
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => bail!("{} did not finish within {} ms", what, limit.as_millis()),
    }
}

fn append_capped(buffer: &mut Vec<u8>, bytes: &[u8], cap: usize) {
    let room = cap.saturating_sub(buffer.len());
    buffer.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

fn shell_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote for POSIX sh
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::adapter_for;
    use grader_common::Language;
    use serde_json::json;

    #[test]
    fn test_shell_quoting() {
        assert_eq!(shell_quote("main.js"), "'main.js'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(
            shell_command(&["java".to_string(), "-cp".to_string(), ".".to_string()]),
            "'java' '-cp' '.'"
        );
    }

    #[test]
    fn test_append_capped() {
        let mut buffer = b"abc".to_vec();
        append_capped(&mut buffer, b"defgh", 5);
        assert_eq!(buffer, b"abcde");
        append_capped(&mut buffer, b"ijk", 5);
        assert_eq!(buffer, b"abcde");
    }

    #[tokio::test]
    async fn test_bounded_reports_the_stalled_call() {
        let err = bounded(
            Duration::from_millis(20),
            "Pulling image",
            std::future::pending::<Result<()>>(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Pulling image did not finish within 20 ms");

        let value = bounded(Duration::from_secs(1), "Inspecting image", async {
            Ok::<_, anyhow::Error>(7)
        })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    /// A daemon that accepts connections and never answers
    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_daemon_is_infrastructure_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let docker =
            Docker::connect_with_unix(socket.to_str().unwrap(), 120, bollard::API_DEFAULT_VERSION)
                .unwrap();
        let engine = DockerEngine::with_client(
            docker,
            LanguageConfigManager::builtin(),
            Duration::from_secs(30),
            1024,
        )
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
        let adapter = adapter_for(Language::Python);
        let entry = adapter
            .extract_entry_point("def solution(x):\n    return x\n")
            .unwrap();
        let invocation = adapter.invoke(&entry, &json!(1)).unwrap();

        let start = Instant::now();
        let outcome = engine.run(&invocation, Duration::from_secs(5)).await;

        match outcome {
            ExecutionOutcome::InfrastructureError(message) => {
                assert!(message.contains("did not finish within 200 ms"), "{}", message)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    #[ignore] // Requires Docker daemon
    async fn test_docker_python_execution() {
        let engine = DockerEngine::new_with_config(
            LanguageConfigManager::builtin(),
            Duration::from_secs(30),
            1024 * 1024,
        )
        .unwrap();
        let adapter = adapter_for(Language::Python);
        let entry = adapter
            .extract_entry_point("def solution(a, b):\n    return a + b\n")
            .unwrap();
        let invocation = adapter.invoke(&entry, &json!([2, 3])).unwrap();

        let outcome = engine.run(&invocation, Duration::from_secs(10)).await;
        assert_eq!(outcome, ExecutionOutcome::Success(json!(5)));
    }

    #[tokio::test]
    #[ignore] // Requires Docker daemon
    async fn test_docker_timeout_kills_container() {
        let engine = DockerEngine::new_with_config(
            LanguageConfigManager::builtin(),
            Duration::from_secs(30),
            1024 * 1024,
        )
        .unwrap();
        let adapter = adapter_for(Language::JavaScript);
        let entry = adapter
            .extract_entry_point("function solution(n) { while (true) {} }")
            .unwrap();
        let invocation = adapter.invoke(&entry, &json!(1)).unwrap();

        // Image pull happens before the deadline starts
        let outcome = engine.run(&invocation, Duration::from_millis(500)).await;
        assert_eq!(outcome, ExecutionOutcome::Timeout);
    }

    #[tokio::test]
    #[ignore] // Requires Docker daemon
    async fn test_docker_cpp_compile_error() {
        let engine = DockerEngine::new_with_config(
            LanguageConfigManager::builtin(),
            Duration::from_secs(60),
            1024 * 1024,
        )
        .unwrap();
        let adapter = adapter_for(Language::Cpp);
        let entry = adapter
            .extract_entry_point("int solution(int n) { return n + undefined_name; }")
            .unwrap();
        let invocation = adapter.invoke(&entry, &json!(1)).unwrap();

        match engine.run(&invocation, Duration::from_secs(10)).await {
            ExecutionOutcome::RuntimeError(message) => {
                assert!(message.starts_with("compilation failed:"))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
