//! Error types for ngxps-pkg

use thiserror::Error;

/// Failures while fetching, building or installing nginx packages
#[derive(Error, Debug, Clone)]
pub enum PackageError {
    /// apt could not resolve the package name
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// Another apt or dpkg process holds the lock
    #[error("lock file conflict: {0}")]
    LockConflict(String),

    /// apt or dpkg needs root
    #[error("insufficient permissions: {0}")]
    PermissionDenied(String),

    /// apt or dpkg exited non-zero for any other reason
    #[error("command failed: {status} - {message}")]
    CommandFailed { status: i32, message: String },

    /// One of configure, make or checkinstall failed
    #[error("build step `{step}` failed: {message}")]
    BuildFailed { step: String, message: String },

    /// A source tarball could not be read or unpacked
    #[error("archive error: {path}: {message}")]
    ArchiveError { path: String, message: String },

    #[error("execution error: {0}")]
    Exec(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl PackageError {
    /// A held dpkg lock is released once the other process finishes
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, PackageError::LockConflict(_))
    }
}

impl From<ngxps_exec::ExecError> for PackageError {
    fn from(err: ngxps_exec::ExecError) -> Self {
        PackageError::Exec(err.to_string())
    }
}

impl From<std::io::Error> for PackageError {
    fn from(err: std::io::Error) -> Self {
        PackageError::Io(err.to_string())
    }
}
