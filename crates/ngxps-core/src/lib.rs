//! ngxps-core: Reactive reconciliation engine
//!
//! Holds the persisted flag store and change detector, the guarded handler
//! table that drives nginx through install, configure, start and
//! reload/upgrade/restart, the status reporter and the `UnitActor` that
//! serialises hook passes.

pub mod actions;
pub mod actor;
pub mod config;
pub mod detector;
pub mod engine;
pub mod environment;
pub mod error;
pub mod flags;
pub mod guard;
pub mod message;
pub mod status;
pub mod store;
pub mod trigger;

pub use actions::{Actions, ServicePause, while_stopped};
pub use actor::{UnitActor, UnitActorArgs};
pub use config::{SiteContext, UnitConfig};
pub use detector::ChangeDetector;
pub use engine::{Engine, HandlerId, HandlerSpec, PassReport, PendingAction, handler_table};
pub use environment::{StaticEnvironment, UnitEnvironment};
pub use error::{ActionError, CoreError};
pub use flags::FlagStore;
pub use guard::Guard;
pub use message::{FlagSnapshot, GetFlags, GetStatus, RunHook, StatusReport};
pub use status::{Severity, StatusBoard, UnitStatus};
pub use store::{JsonFileBackend, MemoryBackend, StateBackend, UnitStore};
pub use trigger::Trigger;
