//! Filesystem layout of the managed server

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where the server and its supporting files live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Install prefix (`conf/`, `ssl/`, `logs/`, `temp/`, `sbin/nginx`)
    pub prefix: PathBuf,
    /// Mount point of the pagespeed cache tmpfs
    pub cache_path: PathBuf,
    pub fstab: PathBuf,
    /// Mount table consulted before remounting
    pub mounts: PathBuf,
    pub init_script: PathBuf,
    pub systemd_unit: PathBuf,
    /// Present when systemd is the running init system
    pub systemd_runtime: PathBuf,
    /// Where installed packages are kept
    pub packages_dir: PathBuf,
    /// Scratch directory for source builds
    pub build_dir: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("/usr/local/nginx"),
            cache_path: PathBuf::from("/var/ngx_pagespeed_cache"),
            fstab: PathBuf::from("/etc/fstab"),
            mounts: PathBuf::from("/proc/mounts"),
            init_script: PathBuf::from("/etc/init.d/nginx"),
            systemd_unit: PathBuf::from("/etc/systemd/system/nginx.service"),
            systemd_runtime: PathBuf::from("/run/systemd/system"),
            packages_dir: PathBuf::from("/root/packages"),
            build_dir: PathBuf::from("/root/build"),
        }
    }
}

fn rebase(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}

impl Layout {
    /// Default layout moved under `root`, for tests and staging trees
    #[must_use]
    pub fn under(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            prefix: rebase(root, &defaults.prefix),
            cache_path: rebase(root, &defaults.cache_path),
            fstab: rebase(root, &defaults.fstab),
            mounts: rebase(root, &defaults.mounts),
            init_script: rebase(root, &defaults.init_script),
            systemd_unit: rebase(root, &defaults.systemd_unit),
            systemd_runtime: rebase(root, &defaults.systemd_runtime),
            packages_dir: rebase(root, &defaults.packages_dir),
            build_dir: rebase(root, &defaults.build_dir),
        }
    }

    #[must_use]
    pub fn conf_dir(&self) -> PathBuf {
        self.prefix.join("conf")
    }

    #[must_use]
    pub fn sites_enabled(&self) -> PathBuf {
        self.conf_dir().join("sites-enabled")
    }

    #[must_use]
    pub fn ssl_dir(&self) -> PathBuf {
        self.prefix.join("ssl")
    }

    #[must_use]
    pub fn dhparams(&self) -> PathBuf {
        self.ssl_dir().join("dhparams.pem")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.prefix.join("logs")
    }

    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.prefix.join("temp")
    }

    #[must_use]
    pub fn binary(&self) -> PathBuf {
        self.prefix.join("sbin").join("nginx")
    }

    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.logs_dir().join("nginx.pid")
    }
}
