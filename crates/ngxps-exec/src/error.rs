//! Error types for ngxps-exec

use std::time::Duration;

use thiserror::Error;

/// Why a host command produced no usable result
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// The command ran but exited non-zero
    #[error("command `{command}` failed: {status} - {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    /// The command was killed after running past its deadline
    #[error("command `{command}` killed after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The shell could not be started
    #[error("cannot start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// The shell started but its output could not be collected
    #[error("lost output of `{command}`: {reason}")]
    Output { command: String, reason: String },
}
