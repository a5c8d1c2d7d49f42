//! Side-effecting operations the engine drives
//!
//! Every operation either reports whether it changed something or fails with
//! an `ActionError`. Lifecycle commands report `false` when the service
//! manager rejected them.

use std::future::Future;

use async_trait::async_trait;
use ngxps_pkg::Artifacts;
use tracing::{debug, warn};

use crate::config::{SiteContext, UnitConfig};
use crate::detector::ChangeDetector;
use crate::error::{ActionError, CoreError};

#[async_trait]
pub trait Actions: Send + Sync {
    /// Install the server from `artifacts`
    ///
    /// Returns `false` without touching the host when the recorded artifact
    /// identity matches. The identity is committed only after success.
    async fn install(
        &self,
        artifacts: &Artifacts,
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError>;

    /// Render the global configuration files
    async fn configure(&self, config: &UnitConfig) -> Result<bool, ActionError>;

    /// Render the cache configuration; no peers means a local file cache
    async fn set_cache(&self, peers: &[String]) -> Result<bool, ActionError>;

    /// Check the configuration with the server binary
    async fn validate_config(&self) -> Result<bool, ActionError>;

    /// (Re)mount the cache tmpfs with `size_mb` megabytes
    async fn create_tmpfs(&self, size_mb: u64) -> Result<(), ActionError>;

    /// Regenerate the Diffie-Hellman parameters
    async fn create_dh_key(&self, bits: u32) -> Result<(), ActionError>;

    /// Render one site directory
    async fn add_site(&self, site: &SiteContext) -> Result<(), ActionError>;

    /// Remove every site not named in `names`
    ///
    /// Returns whether the fingerprint of all site files changed.
    async fn enable_sites(
        &self,
        names: &[String],
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError>;

    /// Names of the site directories currently on disk
    async fn enabled_sites(&self) -> Result<Vec<String>, ActionError>;

    async fn no_sites(&self) -> Result<bool, ActionError> {
        Ok(self.enabled_sites().await?.is_empty())
    }

    /// Install the boot-time unit
    async fn enable(&self) -> Result<bool, ActionError>;

    /// Remove the boot-time unit
    async fn disable(&self) -> Result<bool, ActionError>;

    async fn start(&self) -> Result<bool, ActionError>;
    async fn stop(&self) -> Result<bool, ActionError>;
    async fn restart(&self) -> Result<bool, ActionError>;
    async fn reload(&self) -> Result<bool, ActionError>;
    async fn upgrade(&self) -> Result<bool, ActionError>;
    async fn running(&self) -> Result<bool, ActionError>;
}

/// Service stopped for the duration of a mutation
///
/// `acquire` stops the service if it is running, `release` starts it again.
/// A pause dropped without `release` leaves the service stopped and logs a
/// warning.
pub struct ServicePause<'a> {
    actions: &'a dyn Actions,
    was_running: bool,
    released: bool,
}

impl<'a> ServicePause<'a> {
    /// Stop the service if it is running
    ///
    /// # Errors
    /// Returns an error if the probe fails or the stop is rejected
    pub async fn acquire(actions: &'a dyn Actions) -> Result<Self, CoreError> {
        let was_running = actions.running().await?;
        if was_running {
            debug!("stopping nginx for mutation");
            if !actions.stop().await? {
                return Err(CoreError::Service {
                    action: "stop".to_string(),
                });
            }
        }

        Ok(Self {
            actions,
            was_running,
            released: false,
        })
    }

    #[must_use]
    pub fn was_running(&self) -> bool {
        self.was_running
    }

    /// Start the service again if it was running before `acquire`
    ///
    /// # Errors
    /// Returns an error if the start fails or is rejected
    pub async fn release(mut self) -> Result<(), CoreError> {
        self.released = true;
        if !self.was_running {
            return Ok(());
        }

        debug!("starting nginx after mutation");
        if self.actions.start().await? {
            Ok(())
        } else {
            Err(CoreError::Service {
                action: "start".to_string(),
            })
        }
    }
}

impl Drop for ServicePause<'_> {
    fn drop(&mut self) {
        if self.was_running && !self.released {
            warn!("service pause dropped without release, nginx left stopped");
        }
    }
}

/// Run `work` with the service stopped
///
/// The start is attempted whether or not `work` succeeded. An error from
/// `work` takes precedence over an error from the start.
///
/// # Errors
/// Returns the error of the stop, of `work`, or of the start
pub async fn while_stopped<T, F>(actions: &dyn Actions, work: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, ActionError>> + Send,
{
    let pause = ServicePause::acquire(actions).await?;
    let outcome = work.await;
    let restarted = pause.release().await;

    let value = outcome?;
    restarted?;
    Ok(value)
}
