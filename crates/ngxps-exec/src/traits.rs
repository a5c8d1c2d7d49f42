//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a shell command and capture its output
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a shell command, failing with `ExecError::Timeout` if it does not finish in time
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short name of the executor, used in logs
    fn executor_type(&self) -> &'static str;

    /// Run a command and turn a non-zero exit status into `ExecError::CommandFailed`
    async fn run_checked(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.run(cmd).await?.check()
    }

    /// Run a command and report only whether it exited successfully
    async fn succeeds(&self, cmd: &str) -> Result<bool, ExecError> {
        Ok(self.run(cmd).await?.success())
    }
}
