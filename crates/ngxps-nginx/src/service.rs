//! Service control through systemd or a SysV init script

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use ngxps_core::ActionError;
use ngxps_exec::{CommandExecutor, quote};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::layout::Layout;
use crate::templates::{self, INIT_SCRIPT, SYSTEMD_UNIT, Templates};

const SERVICE: &str = "nginx";

/// Init system that owns the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSystem {
    Systemd,
    SysV,
}

impl InitSystem {
    /// systemd when its runtime directory exists, SysV otherwise
    #[must_use]
    pub fn detect(layout: &Layout) -> Self {
        if layout.systemd_runtime.is_dir() {
            InitSystem::Systemd
        } else {
            InitSystem::SysV
        }
    }

    /// Command line for a lifecycle verb
    ///
    /// systemd has no binary upgrade verb, so an upgrade is a restart there.
    #[must_use]
    pub fn command(self, verb: &str) -> String {
        match self {
            InitSystem::Systemd => {
                let verb = if verb == "upgrade" { "restart" } else { verb };
                format!("systemctl {verb} {SERVICE}")
            }
            InitSystem::SysV => format!("service {SERVICE} {verb}"),
        }
    }

    #[must_use]
    pub fn status_command(self) -> String {
        match self {
            InitSystem::Systemd => format!("systemctl is-active --quiet {SERVICE}"),
            InitSystem::SysV => format!("service {SERVICE} status"),
        }
    }
}

impl std::fmt::Display for InitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitSystem::Systemd => write!(f, "systemd"),
            InitSystem::SysV => write!(f, "sysv"),
        }
    }
}

/// The nginx service on one host
pub struct Service {
    executor: Arc<dyn CommandExecutor>,
    templates: Arc<Templates>,
    layout: Layout,
    init: InitSystem,
}

impl Service {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        templates: Arc<Templates>,
        layout: Layout,
        init: InitSystem,
    ) -> Self {
        Self {
            executor,
            templates,
            layout,
            init,
        }
    }

    #[must_use]
    pub fn init_system(&self) -> InitSystem {
        self.init
    }

    /// Run a lifecycle verb, reporting whether the service manager accepted it
    ///
    /// # Errors
    /// Returns an error only if the command could not be run
    #[instrument(skip(self), fields(init = %self.init))]
    pub async fn lifecycle(&self, verb: &str) -> Result<bool, ActionError> {
        let result = self.executor.run(&self.init.command(verb)).await?;
        if result.success() {
            info!(verb, "nginx {verb} done");
        } else {
            warn!(verb, status = result.status, stderr = %result.stderr, "nginx {verb} rejected");
        }
        Ok(result.success())
    }

    /// Whether the service is currently running
    ///
    /// # Errors
    /// Returns an error only if the probe could not be run
    pub async fn running(&self) -> Result<bool, ActionError> {
        Ok(self.executor.succeeds(&self.init.status_command()).await?)
    }

    /// Check the configuration with `nginx -t`
    ///
    /// # Errors
    /// Returns an error only if the binary could not be run
    pub async fn validate(&self) -> Result<bool, ActionError> {
        let cmd = format!("{} -t -q", quote(&self.layout.binary()));
        let result = self.executor.run(&cmd).await?;
        if !result.success() {
            debug!(stderr = %result.stderr, "configuration test failed");
        }
        Ok(result.success())
    }

    /// Install the boot-time unit, returning whether it changed
    ///
    /// # Errors
    /// Returns an error if the unit cannot be written or registered
    pub async fn enable(&self) -> Result<bool, ActionError> {
        let data = templates::init_data(&self.layout);
        match self.init {
            InitSystem::Systemd => {
                let path = &self.layout.systemd_unit;
                let changed = self.templates.render_to(SYSTEMD_UNIT, &data, path)?;
                if changed {
                    self.executor.run_checked("systemctl daemon-reload").await?;
                }
                self.executor
                    .run_checked(&format!("systemctl enable --quiet {SERVICE}"))
                    .await?;
                Ok(changed)
            }
            InitSystem::SysV => {
                let path = &self.layout.init_script;
                let changed = self.templates.render_to(INIT_SCRIPT, &data, path)?;
                make_executable(path)?;
                Ok(changed)
            }
        }
    }

    /// Remove the boot-time unit, returning whether one was removed
    ///
    /// # Errors
    /// Returns an error if the unit exists but cannot be removed
    pub async fn disable(&self) -> Result<bool, ActionError> {
        let path = match self.init {
            InitSystem::Systemd => &self.layout.systemd_unit,
            InitSystem::SysV => &self.layout.init_script,
        };
        if !path.is_file() {
            return Ok(false);
        }

        if self.init == InitSystem::Systemd {
            self.executor
                .succeeds(&format!("systemctl disable --quiet {SERVICE}"))
                .await?;
        }
        std::fs::remove_file(path).map_err(|e| ActionError::io(path, e))?;
        if self.init == InitSystem::Systemd {
            self.executor.run_checked("systemctl daemon-reload").await?;
        }

        info!(unit = %path.display(), "boot unit removed");
        Ok(true)
    }
}

fn make_executable(path: &Path) -> Result<(), ActionError> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| ActionError::io(path, e))
}
