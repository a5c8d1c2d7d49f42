//! ngxps-exec: Host command execution
//!
//! Provides the executor trait used by every side-effecting step of the unit
//! (package installs, builds, service control, mounts) and its local implementation.

pub mod error;
pub mod local;
pub mod result;
pub mod shell;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use shell::quote;
pub use traits::CommandExecutor;
