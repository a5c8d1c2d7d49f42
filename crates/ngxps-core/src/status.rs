//! Unit status reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MSG_RUNNING: &str = "nginx running";
pub const MSG_NOT_RUNNING: &str = "nginx not running";
pub const MSG_INVALID_CONFIG: &str = "nginx configuration invalid";

/// Severity of the displayed unit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cannot make progress without operator input
    Blocked,
    /// Working, or running degraded
    Maintenance,
    /// Serving
    Active,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Blocked => write!(f, "blocked"),
            Severity::Maintenance => write!(f, "maintenance"),
            Severity::Active => write!(f, "active"),
        }
    }
}

/// A displayed status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub severity: Severity,
    pub message: String,
    /// When this status was first displayed
    pub since: DateTime<Utc>,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Status derived from the service probes
///
/// A failed validation is reported on its own and never mentions whether the
/// process is running.
#[must_use]
pub fn service_status(running: bool, valid: bool) -> (Severity, &'static str) {
    match (valid, running) {
        (false, _) => (Severity::Maintenance, MSG_INVALID_CONFIG),
        (true, true) => (Severity::Active, MSG_RUNNING),
        (true, false) => (Severity::Maintenance, MSG_NOT_RUNNING),
    }
}

/// Currently displayed status, persisted with the flags
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusBoard {
    current: Option<UnitStatus>,
}

impl StatusBoard {
    #[must_use]
    pub fn current(&self) -> Option<&UnitStatus> {
        self.current.as_ref()
    }

    /// Display a status unless the same one is already shown
    ///
    /// Returns whether the displayed status changed.
    pub fn set(&mut self, severity: Severity, message: impl Into<String>) -> bool {
        let message = message.into();
        if let Some(current) = &self.current
            && current.severity == severity
            && current.message == message
        {
            return false;
        }

        info!(severity = %severity, message = %message, "status changed");
        self.current = Some(UnitStatus {
            severity,
            message,
            since: Utc::now(),
        });
        true
    }
}
