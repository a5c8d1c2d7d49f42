//! Commands run on this machine through `sh -c`

use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::traits::CommandExecutor;

/// Executor for the host the unit manages
///
/// Every command line goes through `sh -c`, so the callers may use
/// redirections and `VAR=value` prefixes (`RANDFILE=... openssl dhparam`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn shell(cmd: &str) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn collect(cmd: &str, output: Output, duration: Duration) -> CommandResult {
        // Killed by a signal: no exit code
        let status = output.status.code().unwrap_or(-1);
        let result = CommandResult {
            command: cmd.to_string(),
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        };

        if result.success() {
            debug!(command = %cmd, ?duration, "command finished");
        } else {
            warn!(command = %cmd, status, stderr = %result.stderr.trim(), "command exited non-zero");
        }
        result
    }

    async fn spawn_and_wait(cmd: &str) -> Result<CommandResult, ExecError> {
        let started = Instant::now();
        let child = Self::shell(cmd).spawn().map_err(|e| ExecError::Spawn {
            command: cmd.to_string(),
            reason: e.to_string(),
        })?;
        let output = child.wait_with_output().await.map_err(|e| ExecError::Output {
            command: cmd.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::collect(cmd, output, started.elapsed()))
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    #[instrument(skip(self), level = "debug")]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        Self::spawn_and_wait(cmd).await
    }

    /// Dropping the pending future kills the child, so nothing outlives the deadline
    #[instrument(skip(self), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        tokio::time::timeout(timeout, Self::spawn_and_wait(cmd))
            .await
            .unwrap_or_else(|_| {
                warn!(command = %cmd, ?timeout, "command killed at deadline");
                Err(ExecError::Timeout {
                    command: cmd.to_string(),
                    timeout,
                })
            })
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
