//! APT / dpkg package manager (Debian/Ubuntu)

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ngxps_exec::{CommandExecutor, CommandResult, quote};
use tracing::{debug, info, instrument};

use crate::error::PackageError;
use crate::traits::PackageManager;
use crate::types::PackageManagerType;

/// APT package manager implementation
pub struct AptManager {
    /// Executor for running commands
    executor: Arc<dyn CommandExecutor>,
    /// Whether to use sudo
    use_sudo: bool,
}

impl AptManager {
    /// Create a new APT manager
    ///
    /// # Arguments
    /// * `executor` - Executor for running apt and dpkg commands
    /// * `use_sudo` - Whether to prefix commands with sudo
    pub fn new(executor: Arc<dyn CommandExecutor>, use_sudo: bool) -> Self {
        Self { executor, use_sudo }
    }

    /// Build a command with optional sudo
    fn privileged(&self, cmd: &str) -> String {
        if self.use_sudo {
            format!("sudo {cmd}")
        } else {
            cmd.to_string()
        }
    }

    fn apt_cmd(&self, args: &str) -> String {
        self.privileged(&format!("env DEBIAN_FRONTEND=noninteractive apt-get {args}"))
    }

    /// Map a failed apt/dpkg result to the matching error
    fn classify_failure(result: CommandResult) -> PackageError {
        if result.stderr.contains("Could not get lock") || result.stderr.contains("dpkg frontend lock") {
            return PackageError::LockConflict(result.stderr);
        }
        if result.stderr.contains("Permission denied") || result.stderr.contains("are you root?") {
            return PackageError::PermissionDenied(result.stderr);
        }
        if let Some(name) = Self::parse_unable_to_locate(&result.stderr) {
            return PackageError::PackageNotFound(name);
        }
        PackageError::CommandFailed {
            status: result.status,
            message: result.stderr,
        }
    }

    /// Extract the package name from `E: Unable to locate package <name>`
    fn parse_unable_to_locate(stderr: &str) -> Option<String> {
        stderr.lines().find_map(|line| {
            line.split_once("Unable to locate package ")
                .map(|(_, name)| name.trim().to_string())
        })
    }

    /// Parse `dpkg-query -W -f='${Status}'` output
    fn parse_status(output: &str) -> bool {
        output.trim() == "install ok installed"
    }
}

#[async_trait]
impl PackageManager for AptManager {
    #[instrument(skip(self))]
    async fn install(&self, packages: &[&str]) -> Result<(), PackageError> {
        if packages.is_empty() {
            return Ok(());
        }

        info!(count = packages.len(), "installing packages");

        let cmd = self.apt_cmd(&format!("install -y -qq {}", packages.join(" ")));
        let result = self.executor.run(&cmd).await?;

        if !result.success() {
            return Err(Self::classify_failure(result));
        }

        debug!(packages = ?packages, "packages installed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn install_file(&self, path: &Path) -> Result<(), PackageError> {
        info!(package = %path.display(), "installing package file");

        let cmd = self.privileged(&format!("dpkg -i {}", quote(path)));
        let result = self.executor.run(&cmd).await?;

        if !result.success() {
            return Err(Self::classify_failure(result));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_installed(&self, package: &str) -> Result<bool, PackageError> {
        let cmd = format!("dpkg-query -W -f='${{Status}}' {package}");
        let result = self.executor.run(&cmd).await?;

        Ok(result.success() && Self::parse_status(&result.stdout))
    }

    fn manager_type(&self) -> PackageManagerType {
        PackageManagerType::Apt
    }

    async fn is_available(&self) -> bool {
        match self.executor.run("which apt-get && which dpkg").await {
            Ok(result) => result.success(),
            Err(_) => false,
        }
    }
}
