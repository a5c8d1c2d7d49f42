//! Builds the host actions for the local machine

use std::sync::Arc;

use eyre::Result;
use ngxps_exec::{CommandExecutor, LocalExecutor};
use ngxps_nginx::{Layout, NginxActions};
use ngxps_pkg::{AptManager, PackageManager};

/// Host actions backed by local commands
///
/// # Errors
/// Returns error if no supported package manager is present or the templates
/// do not parse
pub async fn create_actions(layout: Layout) -> Result<NginxActions> {
    let executor: Arc<dyn CommandExecutor> = Arc::new(LocalExecutor::new());
    let packages = detect_package_manager(executor.clone()).await?;
    let actions = NginxActions::new(executor, packages, layout)?;
    tracing::info!(init = %actions.init_system(), "host actions created");
    Ok(actions)
}

/// Probe for apt/dpkg and whether commands need sudo
async fn detect_package_manager(
    executor: Arc<dyn CommandExecutor>,
) -> Result<Arc<dyn PackageManager>> {
    let use_sudo = executor
        .run("whoami")
        .await
        .map(|r| r.stdout.trim() != "root")
        .unwrap_or(true);

    let apt = AptManager::new(executor, use_sudo);
    if !apt.is_available().await {
        eyre::bail!("no supported package manager found (need apt-get and dpkg)");
    }

    tracing::info!(use_sudo, "detected apt package manager");
    Ok(Arc::new(apt))
}
