//! External command execution.
//!
//! Every probe reaches git, tmux and the review CLI through a
//! [`CommandRunner`]. The system implementation shells out with
//! `tokio::process`; tests substitute a scripted runner.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use arbor_core::{ProbeError, ProbeResult};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Runner shared between probes.
pub type SharedRunner = Arc<dyn CommandRunner>;

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Run in the given directory.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout of a successful run, or the failure as a [`ProbeError`].
    pub fn require_success(self, spec: &CommandSpec) -> ProbeResult<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(ProbeError::command_failed(
                spec.to_string(),
                self.code,
                self.stderr.trim(),
            ))
        }
    }

    /// Like [`require_success`](Self::require_success) but also rejects
    /// blank output.
    pub fn require_output(self, spec: &CommandSpec) -> ProbeResult<String> {
        let stdout = self.require_success(spec)?;
        if stdout.trim().is_empty() {
            return Err(ProbeError::EmptyOutput {
                command: spec.to_string(),
            });
        }
        Ok(stdout)
    }
}

/// Executes external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr.
    async fn run(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput>;

    /// Run with the terminal handed over to the child, blocking until it exits.
    async fn run_interactive(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput>;

    /// Run and return stdout of a successful exit.
    async fn stdout(&self, spec: &CommandSpec) -> ProbeResult<String> {
        self.run(spec).await?.require_success(spec)
    }
}

/// Runner backed by real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn shared() -> SharedRunner {
        Arc::new(Self)
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn unavailable(spec: &CommandSpec, e: std::io::Error) -> ProbeError {
        ProbeError::ToolUnavailable {
            program: spec.program.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(level = "debug", skip_all, fields(command = %spec))]
    async fn run(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        let output = Self::command(spec)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Self::unavailable(spec, e))?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(code = ?result.code, bytes = result.stdout.len(), "command finished");
        Ok(result)
    }

    #[instrument(level = "debug", skip_all, fields(command = %spec))]
    async fn run_interactive(&self, spec: &CommandSpec) -> ProbeResult<CommandOutput> {
        let status = Self::command(spec)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Self::unavailable(spec, e))?;

        Ok(CommandOutput {
            code: status.code(),
            ..Default::default()
        })
    }
}
