//! Package manager traits

use std::path::Path;

use async_trait::async_trait;

use crate::error::PackageError;
use crate::types::PackageManagerType;

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Install packages from the configured repositories
    async fn install(&self, packages: &[&str]) -> Result<(), PackageError>;

    /// Install a package file that is already on the host
    async fn install_file(&self, path: &Path) -> Result<(), PackageError>;

    /// Check whether a package is installed
    async fn is_installed(&self, package: &str) -> Result<bool, PackageError>;

    fn manager_type(&self) -> PackageManagerType;

    async fn is_available(&self) -> bool;
}
