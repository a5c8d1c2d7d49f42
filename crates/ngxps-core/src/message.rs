//! Message types for actor communication
//!
//! Message handlers are implemented in `actor.rs`.

use kameo_macros::Reply;
use serde::Serialize;

use crate::status::UnitStatus;
use crate::trigger::Trigger;

/// Run one reconciliation pass
#[derive(Debug)]
pub struct RunHook {
    pub trigger: Trigger,
}

/// Get the current flags
#[derive(Debug)]
pub struct GetFlags;

/// Get the displayed status
#[derive(Debug)]
pub struct GetStatus;

/// Flags currently set, sorted
#[derive(Debug, Clone, Serialize, Reply)]
pub struct FlagSnapshot {
    pub flags: Vec<String>,
}

/// Displayed status, `None` before the first pass that set one
#[derive(Debug, Clone, Serialize, Reply)]
pub struct StatusReport {
    pub status: Option<UnitStatus>,
}
