//! Installing the server from a package or from sources

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ngxps_core::detector::keys;
use ngxps_core::{ActionError, ChangeDetector};
use ngxps_exec::CommandExecutor;
use ngxps_pkg::{Artifacts, PackageManager, SourceBuild};
use tracing::{info, instrument};

use crate::layout::Layout;

/// Installs nginx and records the identity of what was installed
pub struct Installer {
    executor: Arc<dyn CommandExecutor>,
    packages: Arc<dyn PackageManager>,
    layout: Layout,
}

impl Installer {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        packages: Arc<dyn PackageManager>,
        layout: Layout,
    ) -> Self {
        Self {
            executor,
            packages,
            layout,
        }
    }

    /// Install from `artifacts` unless the recorded identity matches
    ///
    /// The identity baseline is committed only once the package is installed,
    /// so an interrupted install is retried by the next call.
    ///
    /// # Errors
    /// Returns an error if the build, copy or package install fails
    #[instrument(skip(self, detector))]
    pub async fn install(
        &self,
        artifacts: &Artifacts,
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError> {
        let identity = artifacts.identity()?;
        if !detector.peek(keys::ARTIFACTS, &identity)? {
            info!("artifacts unchanged, skipping install");
            return Ok(false);
        }

        let deb = match artifacts {
            Artifacts::Prebuilt { deb } => deb.clone(),
            Artifacts::Sources(sources) => {
                SourceBuild::new(
                    self.executor.clone(),
                    self.packages.clone(),
                    &self.layout.build_dir,
                )
                .build(sources)
                .await?
            }
        };

        let stored = self.store_package(&deb)?;
        self.packages.install_file(&stored).await?;

        for dir in [self.layout.logs_dir(), self.layout.temp_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| ActionError::io(&dir, e))?;
        }

        detector.commit(keys::ARTIFACTS, &identity)?;
        info!(package = %stored.display(), "nginx installed");
        Ok(true)
    }

    /// Copy a package into the packages directory
    fn store_package(&self, deb: &Path) -> Result<PathBuf, ActionError> {
        let dir = &self.layout.packages_dir;
        std::fs::create_dir_all(dir).map_err(|e| ActionError::io(dir, e))?;

        let name = deb
            .file_name()
            .ok_or_else(|| ActionError::io(deb, "package path has no file name"))?;
        let stored = dir.join(name);
        if stored != deb {
            std::fs::copy(deb, &stored).map_err(|e| ActionError::io(deb, e))?;
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use ngxps_pkg::{AptManager, SourceArchives};

    use super::*;
    use crate::testing::{ScriptedExecutor, write_archive};

    struct Fixture {
        dir: tempfile::TempDir,
        executor: Arc<ScriptedExecutor>,
        installer: Installer,
        deb: PathBuf,
    }

    fn fixture(executor: Arc<ScriptedExecutor>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::under(dir.path());
        let deb = dir.path().join("nginx_1.10.1-1_amd64.deb");
        std::fs::write(&deb, b"package v1").unwrap();

        let packages = Arc::new(AptManager::new(executor.clone(), false));
        let installer = Installer::new(executor.clone(), packages, layout);
        Fixture {
            dir,
            executor,
            installer,
            deb,
        }
    }

    fn dpkg_runs(executor: &ScriptedExecutor) -> usize {
        executor
            .commands()
            .iter()
            .filter(|c| c.starts_with("dpkg -i"))
            .count()
    }

    #[tokio::test]
    async fn test_install_is_idempotent_on_identity() {
        let f = fixture(ScriptedExecutor::new());
        let artifacts = Artifacts::Prebuilt { deb: f.deb.clone() };
        let mut detector = ChangeDetector::new();

        assert!(f.installer.install(&artifacts, &mut detector).await.unwrap());
        assert!(!f.installer.install(&artifacts, &mut detector).await.unwrap());
        assert_eq!(dpkg_runs(&f.executor), 1);

        let layout = Layout::under(f.dir.path());
        assert!(layout.packages_dir.join("nginx_1.10.1-1_amd64.deb").is_file());
        assert!(layout.logs_dir().is_dir());
        assert!(layout.temp_dir().is_dir());
    }

    #[tokio::test]
    async fn test_new_package_content_reinstalls() {
        let f = fixture(ScriptedExecutor::new());
        let artifacts = Artifacts::Prebuilt { deb: f.deb.clone() };
        let mut detector = ChangeDetector::new();

        f.installer.install(&artifacts, &mut detector).await.unwrap();
        std::fs::write(&f.deb, b"package v2").unwrap();

        assert!(f.installer.install(&artifacts, &mut detector).await.unwrap());
        assert_eq!(dpkg_runs(&f.executor), 2);
    }

    #[tokio::test]
    async fn test_failed_install_leaves_no_baseline() {
        let f = fixture(ScriptedExecutor::failing(&["dpkg -i"]));
        let artifacts = Artifacts::Prebuilt { deb: f.deb.clone() };
        let mut detector = ChangeDetector::new();

        let err = f.installer.install(&artifacts, &mut detector).await.unwrap_err();

        assert!(matches!(err, ActionError::Package(_)));
        assert!(detector.baseline(keys::ARTIFACTS).is_none());
    }

    struct SourceFixture {
        _dir: tempfile::TempDir,
        layout: Layout,
        executor: Arc<ScriptedExecutor>,
        installer: Installer,
        artifacts: Artifacts,
    }

    /// Four source archives; `checkinstall` leaves the package in the nginx tree
    fn source_fixture(failing: &[&str]) -> SourceFixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::under(dir.path());

        let resources = dir.path().join("resources");
        std::fs::create_dir_all(&resources).unwrap();
        let archive = |file: &str, root: &str| {
            let path = resources.join(file);
            write_archive(&path, root);
            path
        };
        let artifacts = Artifacts::Sources(SourceArchives {
            nginx: archive("nginx.tar.gz", "nginx-1.10.1"),
            pagespeed: archive("ngx_pagespeed.tar.gz", "ngx_pagespeed-1.11.33.2-beta"),
            psol: archive("psol.tar.gz", "psol"),
            naxsi: archive("naxsi.tar.gz", "naxsi-0.55.1"),
        });

        let built = layout.build_dir.join("nginx-1.10.1").join(format!(
            "nginx_1.10.1-1_{}.deb",
            SourceBuild::arch()
        ));
        let executor = ScriptedExecutor::scripted(failing, &[("checkinstall", built.as_path())]);
        let packages = Arc::new(AptManager::new(executor.clone(), false));
        let installer = Installer::new(executor.clone(), packages, layout.clone());

        SourceFixture {
            _dir: dir,
            layout,
            executor,
            installer,
            artifacts,
        }
    }

    fn step_of(cmd: &str) -> Option<&'static str> {
        ["apt-get install", "./configure", "&& make >", "checkinstall", "dpkg -i"]
            .into_iter()
            .find(|step| cmd.contains(step))
    }

    #[tokio::test]
    async fn test_source_build_runs_once_per_archive_set() {
        let f = source_fixture(&[]);
        let mut detector = ChangeDetector::new();

        assert!(f.installer.install(&f.artifacts, &mut detector).await.unwrap());

        let steps: Vec<_> = f.executor.commands().iter().filter_map(|c| step_of(c)).collect();
        assert_eq!(
            steps,
            vec!["apt-get install", "./configure", "&& make >", "checkinstall", "dpkg -i"]
        );

        // psol is unpacked inside the pagespeed tree
        let nps = f.layout.build_dir.join("ngx_pagespeed-1.11.33.2-beta");
        assert!(nps.join("psol").join("README").is_file());
        assert!(f.layout.build_dir.join("naxsi-0.55.1").is_dir());

        let stored = f
            .layout
            .packages_dir
            .join(format!("nginx_1.10.1-1_{}.deb", SourceBuild::arch()));
        assert!(stored.is_file());
        let dpkg = f.executor.commands().into_iter().find(|c| c.starts_with("dpkg -i"));
        assert_eq!(dpkg, Some(format!("dpkg -i {}", stored.display())));

        // Byte-identical archives: nothing is compiled or installed again
        let before = f.executor.commands().len();
        assert!(!f.installer.install(&f.artifacts, &mut detector).await.unwrap());
        assert_eq!(f.executor.commands().len(), before);
    }

    #[tokio::test]
    async fn test_failed_compile_leaves_no_baseline() {
        let f = source_fixture(&["&& make >"]);
        let mut detector = ChangeDetector::new();

        let err = f
            .installer
            .install(&f.artifacts, &mut detector)
            .await
            .unwrap_err();

        match err {
            ActionError::Package(message) => {
                assert!(message.contains("build step `make` failed"), "{message}");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(detector.baseline(keys::ARTIFACTS).is_none());

        let commands = f.executor.commands();
        assert!(!commands.iter().any(|c| c.contains("checkinstall")));
        assert!(!commands.iter().any(|c| c.starts_with("dpkg -i")));
    }
}
