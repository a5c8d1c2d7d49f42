//! Core error types for ngxps-core

use thiserror::Error;

/// Errors raised by side-effecting actions against the host
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    /// Host command failed or could not be run
    #[error("command error: {0}")]
    Exec(String),

    /// Package install or source build failed
    #[error("package error: {0}")]
    Package(String),

    /// Template could not be rendered
    #[error("failed to render template {template}: {message}")]
    Template {
        /// Template name
        template: String,
        /// Renderer message
        message: String,
    },

    /// Filesystem operation failed
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Path being accessed
        path: String,
        /// Error message
        message: String,
    },

    /// Baseline bookkeeping failed
    #[error("baseline error: {0}")]
    Baseline(String),
}

impl ActionError {
    /// Build an I/O error for a path
    pub fn io(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        ActionError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ngxps_exec::ExecError> for ActionError {
    fn from(err: ngxps_exec::ExecError) -> Self {
        ActionError::Exec(err.to_string())
    }
}

impl From<ngxps_pkg::PackageError> for ActionError {
    fn from(err: ngxps_pkg::PackageError) -> Self {
        ActionError::Package(err.to_string())
    }
}

impl From<CoreError> for ActionError {
    fn from(err: CoreError) -> Self {
        ActionError::Baseline(err.to_string())
    }
}

/// Errors that can occur while running reconciliation passes
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// An action failed and aborted the handler
    #[error(transparent)]
    Action(#[from] ActionError),

    /// A lifecycle command reported failure where success was required
    #[error("service {action} failed")]
    Service {
        /// Lifecycle action (stop, start)
        action: String,
    },

    /// Persisted state could not be loaded or saved
    #[error("state store error: {0}")]
    Store(String),

    /// Value could not be serialised for comparison or storage
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unit configuration or environment is invalid
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Unknown hook name
    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),

    /// Handlers kept re-arming each other
    #[error("pass did not converge after {sweeps} sweeps")]
    NoConvergence {
        /// Sweeps attempted
        sweeps: usize,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
