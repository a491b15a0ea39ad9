//! External process execution.
//!
//! The orchestrator only sees [`CommandRunner`]; [`TokioCommandRunner`] is the
//! real implementation. Children are spawned with `kill_on_drop`, their output
//! is drained concurrently, and on timeout or cancellation the child is killed
//! before the error is reported.

use crate::error::{DbError, DbResult};
use crate::models::mask_connection_string;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lines of output kept for a failure diagnostic.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// One external program invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment, e.g. `MYSQL_PWD`
    pub env: Vec<(String, String)>,
    /// File fed to the child's stdin
    pub stdin: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Command line safe to log: environment is omitted, URIs and password
    /// arguments are masked.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if arg.starts_with("--password") {
                parts.push("--password=****".to_string());
            } else if arg.contains("://") {
                parts.push(mask_connection_string(arg));
            } else {
                parts.push(arg.clone());
            }
        }
        if let Some(path) = &self.stdin {
            parts.push(format!("< {}", path.display()));
        }
        parts.join(" ")
    }
}

/// What a finished child reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Tail of stderr, or of stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.trim_end().lines().collect();
        let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Deadline and cancellation for one run.
#[derive(Debug, Clone)]
pub struct RunControl {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl RunControl {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is `Ok`; timeouts and cancellation
    /// are errors and leave no child behind.
    async fn run(&self, command: &CommandSpec, control: &RunControl) -> DbResult<CommandOutput>;
}

/// Runs commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: &CommandSpec, control: &RunControl) -> DbResult<CommandOutput> {
        let start = Instant::now();
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        match &command.stdin {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    DbError::invalid_input(format!("Cannot read {}: {}", path.display(), e))
                })?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        debug!(command = %command.display(), "Spawning process");
        let mut child = cmd.spawn().map_err(|e| {
            DbError::process_failure(&command.program, None, format!("failed to start: {}", e))
        })?;

        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep(control.timeout) => {
                kill(&mut child, &command.program).await;
                return Err(DbError::timeout(
                    command.program.clone(),
                    control.timeout.as_secs(),
                ));
            }
            _ = control.cancel.cancelled() => {
                kill(&mut child, &command.program).await;
                return Err(DbError::cancelled(command.program.clone()));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        debug!(
            program = %command.program,
            exit_code = ?status.code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Process exited"
        );

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

async fn kill(child: &mut tokio::process::Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!(program, error = %e, "Failed to kill process");
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "Output stream closed early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
