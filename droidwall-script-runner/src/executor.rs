use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use droidwall_config::ExecutorConfig;
use droidwall_config::constants::execution;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::script_file::ScriptFile;
use crate::stream::{CaptureBuffer, drain_into};
use crate::teardown::Teardown;

/// Exit code reported when a script did not run to completion.
pub const DID_NOT_COMPLETE: i32 = -1;

/// Whether a script runs through the elevation program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    Elevated,
    Unelevated,
}

impl Elevation {
    pub fn is_elevated(self) -> bool {
        matches!(self, Elevation::Elevated)
    }
}

/// Time limit for a single execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptTimeout {
    /// Use the executor's configured timeout.
    #[default]
    Default,
    /// Wait for completion with no limit.
    Indefinite,
    After(Duration),
}

impl ScriptTimeout {
    /// Zero or negative values mean "wait indefinitely".
    pub fn from_millis(millis: i64) -> Self {
        match u64::try_from(millis) {
            Ok(ms) if ms > 0 => ScriptTimeout::After(Duration::from_millis(ms)),
            _ => ScriptTimeout::Indefinite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub body: String,
    pub elevation: Elevation,
    pub timeout: ScriptTimeout,
}

impl ScriptInvocation {
    pub fn elevated(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            elevation: Elevation::Elevated,
            timeout: ScriptTimeout::Default,
        }
    }

    pub fn unelevated(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            elevation: Elevation::Unelevated,
            timeout: ScriptTimeout::Default,
        }
    }

    pub fn with_timeout(mut self, timeout: ScriptTimeout) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of one script execution.
///
/// `output` holds everything written to stdout followed by everything
/// written to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub output: String,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn completed(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            timed_out: false,
        }
    }

    /// Result for a script that could not be run or did not finish.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            exit_code: DID_NOT_COMPLETE,
            output: output.into(),
            timed_out: false,
        }
    }

    /// Result for a script torn down at its deadline.
    pub fn timed_out(partial_output: impl Into<String>) -> Self {
        let mut output = partial_output.into();
        output.push_str(execution::TIMEOUT_NOTICE);
        Self {
            exit_code: DID_NOT_COMPLETE,
            output,
            timed_out: true,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Output with the filter tool's generic usage hint removed.
    pub fn diagnostic(&self) -> String {
        self.output.replace(execution::TOOL_HELP_HINT, "")
    }
}

/// Internal failures while preparing or supervising a script.
///
/// These never escape [`ScriptRunner::execute`]; they are rendered into the
/// result's output text.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to prepare script directory {dir}: {source}")]
    Prepare {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write script file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to mark script {path} executable: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to capture {stream} of `{program}`")]
    MissingPipe {
        program: String,
        stream: &'static str,
    },

    #[error("failed to read {stream}: {source}")]
    Drain {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("output reader for {stream} stopped unexpectedly")]
    DrainJoin { stream: &'static str },

    #[error("failed to wait for script: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}

/// Abstraction over script execution so callers can substitute a recording
/// runner in tests.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn execute(&self, invocation: ScriptInvocation) -> ExecutionResult;

    /// Run `body` through the elevation program with the default timeout.
    async fn execute_elevated(&self, body: String) -> ExecutionResult {
        self.execute(ScriptInvocation::elevated(body)).await
    }

    async fn execute_unelevated(&self, body: String) -> ExecutionResult {
        self.execute(ScriptInvocation::unelevated(body)).await
    }
}

/// Runs scripts as real child processes.
///
/// Elevated executions are serialized; unelevated ones run concurrently.
#[derive(Debug)]
pub struct ScriptExecutor {
    config: ExecutorConfig,
    script_dir: PathBuf,
    elevated_lock: Mutex<()>,
}

impl ScriptExecutor {
    pub fn new(config: ExecutorConfig, script_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            script_dir: script_dir.into(),
            elevated_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    fn resolve_timeout(&self, timeout: ScriptTimeout) -> Option<Duration> {
        match timeout {
            ScriptTimeout::Default => self.config.timeout(),
            ScriptTimeout::Indefinite => None,
            ScriptTimeout::After(limit) => Some(limit),
        }
    }

    fn build_command(&self, elevation: Elevation, script: &Path) -> (String, Command) {
        let (program, mut command) = match elevation {
            Elevation::Elevated => {
                let program = self.config.elevation_program.clone();
                let mut command = Command::new(&program);
                command.arg("-c").arg(script);
                (program, command)
            }
            Elevation::Unelevated => {
                let program = self.config.shell_program.clone();
                let mut command = Command::new(&program);
                command.arg(script);
                (program, command)
            }
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        (program, command)
    }

    async fn run(&self, invocation: &ScriptInvocation) -> Result<ExecutionResult, ScriptError> {
        let script = ScriptFile::materialize(&self.script_dir, &invocation.body)?;
        let (program, mut command) = self.build_command(invocation.elevation, script.path());

        let mut child = command.spawn().map_err(|source| ScriptError::Spawn {
            program: program.clone(),
            source,
        })?;
        debug!(
            program = %program,
            pid = child.id(),
            script = %script.path().display(),
            "script started"
        );

        let stdout_buf = CaptureBuffer::with_limit(self.config.max_output_bytes);
        let stderr_buf = CaptureBuffer::with_limit(self.config.max_output_bytes);
        let stdout_task = spawn_drain(&mut child, &program, "stdout", stdout_buf.clone())?;
        let stderr_task = spawn_drain(&mut child, &program, "stderr", stderr_buf.clone())?;

        let limit = self.resolve_timeout(invocation.timeout);
        let completion = collect_until_exit(&mut child, stdout_task, stderr_task);
        let finished = match limit {
            Some(limit) => tokio::time::timeout(limit, completion).await.ok(),
            None => Some(completion.await),
        };

        match finished {
            Some(status) => {
                let status = status?;
                let output = join_streams(&stdout_buf, &stderr_buf);
                Ok(ExecutionResult::completed(exit_code(status), output))
            }
            None => {
                let mut teardown =
                    Teardown::new(self.config.grace_period(), self.config.reap_wait());
                let outcome = teardown.run(&mut child).await;
                info!(
                    program = %program,
                    timeout_ms = limit.map(|d| d.as_millis()),
                    ?outcome,
                    "script timed out"
                );
                Ok(ExecutionResult::timed_out(join_streams(
                    &stdout_buf,
                    &stderr_buf,
                )))
            }
        }
    }
}

#[async_trait]
impl ScriptRunner for ScriptExecutor {
    async fn execute(&self, invocation: ScriptInvocation) -> ExecutionResult {
        let _serialized = if invocation.elevation.is_elevated() {
            Some(self.elevated_lock.lock().await)
        } else {
            None
        };

        match self.run(&invocation).await {
            Ok(result) => {
                debug!(
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    "script finished"
                );
                result
            }
            Err(err) => {
                warn!(error = %err, "script execution failed");
                ExecutionResult::failed(format!("\n{err}"))
            }
        }
    }
}

fn spawn_drain(
    child: &mut Child,
    program: &str,
    stream: &'static str,
    sink: CaptureBuffer,
) -> Result<JoinHandle<std::io::Result<()>>, ScriptError> {
    let missing = || ScriptError::MissingPipe {
        program: program.to_string(),
        stream,
    };
    let handle = if stream == "stdout" {
        let pipe = child.stdout.take().ok_or_else(missing)?;
        tokio::spawn(drain_into(pipe, sink))
    } else {
        let pipe = child.stderr.take().ok_or_else(missing)?;
        tokio::spawn(drain_into(pipe, sink))
    };
    Ok(handle)
}

/// Drain both streams to EOF, then read the exit status.
async fn collect_until_exit(
    child: &mut Child,
    stdout_task: JoinHandle<std::io::Result<()>>,
    stderr_task: JoinHandle<std::io::Result<()>>,
) -> Result<ExitStatus, ScriptError> {
    let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
    finish_drain("stdout", stdout)?;
    finish_drain("stderr", stderr)?;
    child
        .wait()
        .await
        .map_err(|source| ScriptError::Wait { source })
}

fn finish_drain(
    stream: &'static str,
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), ScriptError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ScriptError::Drain { stream, source }),
        Err(_) => Err(ScriptError::DrainJoin { stream }),
    }
}

fn join_streams(stdout: &CaptureBuffer, stderr: &CaptureBuffer) -> String {
    if stdout.truncated() || stderr.truncated() {
        warn!("script output exceeded the capture limit and was truncated");
    }
    let mut bytes = stdout.snapshot();
    bytes.extend_from_slice(&stderr.snapshot());
    String::from_utf8_lossy(&bytes).into_owned()
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(DID_NOT_COMPLETE)
}
