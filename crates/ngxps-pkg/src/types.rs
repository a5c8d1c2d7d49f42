//! Type definitions for install artifacts

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive;
use crate::error::PackageError;

/// Resource name of the pre-built package
pub const DEB_RESOURCE: &str = "ngxps_deb";
/// Resource name of the nginx source archive
pub const NGINX_RESOURCE: &str = "nginx";
/// Resource name of the ngx_pagespeed source archive
pub const PAGESPEED_RESOURCE: &str = "ngx_pagespeed";
/// Resource name of the PSOL binary library archive
pub const PSOL_RESOURCE: &str = "psol";
/// Resource name of the naxsi source archive
pub const NAXSI_RESOURCE: &str = "naxsi";

/// The four source archives needed to build nginx with both modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArchives {
    pub nginx: PathBuf,
    pub pagespeed: PathBuf,
    pub psol: PathBuf,
    pub naxsi: PathBuf,
}

impl SourceArchives {
    /// Archives in build order
    #[must_use]
    pub fn paths(&self) -> [&Path; 4] {
        [&self.nginx, &self.pagespeed, &self.psol, &self.naxsi]
    }
}

/// Install inputs for the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Artifacts {
    /// A single pre-built `.deb`
    Prebuilt { deb: PathBuf },
    /// Source archives that are compiled on the host
    Sources(SourceArchives),
}

impl Artifacts {
    /// Build the artifact set from a resource lookup
    ///
    /// A pre-built package wins over sources. When neither set is complete the
    /// missing resource names are returned.
    ///
    /// # Errors
    /// Returns the names of the missing resources
    pub fn resolve<F>(lookup: F) -> Result<Self, Vec<String>>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        if let Some(deb) = lookup(DEB_RESOURCE) {
            return Ok(Artifacts::Prebuilt { deb });
        }

        let names = [
            NGINX_RESOURCE,
            PAGESPEED_RESOURCE,
            PSOL_RESOURCE,
            NAXSI_RESOURCE,
        ];
        let found: Vec<Option<PathBuf>> = names.iter().map(|name| lookup(name)).collect();

        let missing: Vec<String> = names
            .iter()
            .zip(&found)
            .filter(|(_, path)| path.is_none())
            .map(|(name, _)| (*name).to_string())
            .collect();

        match found.as_slice() {
            [Some(nginx), Some(pagespeed), Some(psol), Some(naxsi)] => {
                Ok(Artifacts::Sources(SourceArchives {
                    nginx: nginx.clone(),
                    pagespeed: pagespeed.clone(),
                    psol: psol.clone(),
                    naxsi: naxsi.clone(),
                }))
            }
            // Report the pre-built package too when nothing at all was supplied
            _ if missing.len() == names.len() => {
                let mut all = vec![DEB_RESOURCE.to_string()];
                all.extend(missing);
                Err(all)
            }
            _ => Err(missing),
        }
    }

    /// Identity used to decide whether an install is needed
    ///
    /// Sources are identified by each archive's top-level directory name, a
    /// pre-built package by its file name and content digest.
    ///
    /// # Errors
    /// Returns an error if an archive cannot be read
    pub fn identity(&self) -> Result<Vec<String>, PackageError> {
        match self {
            Artifacts::Prebuilt { deb } => {
                let name = deb
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(vec![format!("{name}@{}", archive::file_digest(deb)?)])
            }
            Artifacts::Sources(sources) => sources
                .paths()
                .iter()
                .map(|path| archive::tar_root(path))
                .collect(),
        }
    }
}

/// Package manager type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManagerType {
    /// APT + dpkg (Debian/Ubuntu)
    Apt,
}

impl std::fmt::Display for PackageManagerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageManagerType::Apt => write!(f, "apt"),
        }
    }
}
