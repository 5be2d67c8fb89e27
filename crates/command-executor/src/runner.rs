//! Runners that execute a [`Command`] to completion
//!
//! The [`CommandRunner`] trait is the seam callers are written against, so a
//! scripted runner can stand in for the real process backend in tests.

use crate::command::Command;
use crate::error::{Error, Result};
use async_process::Stdio;
use async_trait::async_trait;
use futures_lite::{AsyncWriteExt, future};
use std::time::Duration;
use tracing::debug;

/// Captured outcome of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExitResult {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ExitResult {
    /// A successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run a command to completion within a deadline
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, capturing stdout/stderr, killing it once `timeout` elapses
    async fn run(&self, command: Command, timeout: Duration) -> Result<ExitResult>;
}

/// Runner for executing processes on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: Command, timeout: Duration) -> Result<ExitResult> {
        let rendered = command.to_string();
        debug!(command = %rendered, ?timeout, "running command");

        let mut async_cmd = command.prepare();
        async_cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if command.get_stdin().is_some() {
            async_cmd.stdin(Stdio::piped());
        } else {
            async_cmd.stdin(Stdio::null());
        }

        let mut child = async_cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(format!("{}: {}", rendered, e)))?;

        let finished = async {
            if let (Some(payload), Some(mut stdin)) = (command.get_stdin(), child.stdin.take()) {
                stdin.write_all(payload).await?;
                stdin.close().await?;
            }
            child.output().await.map_err(Error::from)
        };
        let expired = async {
            async_io::Timer::after(timeout).await;
            Err(Error::Timeout {
                command: rendered.clone(),
                after: timeout,
            })
        };

        // Dropping the losing future drops the child, which kills it.
        let output = future::or(finished, expired).await?;

        Ok(ExitResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
