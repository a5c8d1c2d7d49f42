//! Source build of nginx with the pagespeed and naxsi modules

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ngxps_exec::{CommandExecutor, quote};
use tracing::{info, instrument};

use crate::archive;
use crate::error::PackageError;
use crate::traits::PackageManager;
use crate::types::SourceArchives;

/// Build dependencies installed before compiling
pub const BUILD_PACKAGES: &[&str] = &[
    "build-essential",
    "zlib1g-dev",
    "libssl-dev",
    "libpcre3",
    "libpcre3-dev",
    "unzip",
    "geoip-database",
    "wget",
    "libgeoip1",
    "libgeoip-dev",
    "checkinstall",
];

/// Options passed to nginx's `./configure` besides the two modules
pub const BUILD_OPTS: &[&str] = &[
    "--with-http_ssl_module",
    "--with-http_gzip_static_module",
    "--without-mail_pop3_module",
    "--without-mail_smtp_module",
    "--without-mail_imap_module",
    "--with-http_geoip_module",
    "--http-client-body-temp-path=/usr/local/nginx/temp/body",
    "--http-fastcgi-temp-path=/usr/local/nginx/temp/fastcgi",
    "--http-proxy-temp-path=/usr/local/nginx/temp/proxy",
    "--http-scgi-temp-path=/usr/local/nginx/temp/scgi",
    "--http-uwsgi-temp-path=/usr/local/nginx/temp/uwsgi",
];

const PACKAGE_NAME: &str = "nginx";
const PACKAGE_RELEASE: &str = "1";

/// Compiles and packages nginx from source archives
pub struct SourceBuild {
    executor: Arc<dyn CommandExecutor>,
    packages: Arc<dyn PackageManager>,
    build_dir: PathBuf,
}

impl SourceBuild {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        packages: Arc<dyn PackageManager>,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            packages,
            build_dir: build_dir.into(),
        }
    }

    /// Version encoded in the nginx source directory (`nginx-1.10.1` -> `1.10.1`)
    #[must_use]
    pub fn version_of(nginx_src: &Path) -> Option<String> {
        let name = nginx_src.file_name()?.to_string_lossy();
        name.split_once('-').map(|(_, version)| version.to_string())
    }

    /// Debian architecture name of the host
    #[must_use]
    pub fn arch() -> &'static str {
        if std::env::consts::ARCH == "x86_64" {
            "amd64"
        } else {
            "i386"
        }
    }

    /// `./configure` invocation for the extracted sources
    #[must_use]
    pub fn configure_command(nginx_src: &Path, nps_src: &Path, naxsi_src: &Path) -> String {
        let mut args = vec![
            "./configure".to_string(),
            format!("--add-module={}", quote(nps_src)),
            format!("--add-module={}", quote(&naxsi_src.join("naxsi_src"))),
        ];
        args.extend(BUILD_OPTS.iter().map(|opt| (*opt).to_string()));
        format!("cd {} && {} > /dev/null", quote(nginx_src), args.join(" "))
    }

    async fn step(&self, name: &str, cmd: &str) -> Result<(), PackageError> {
        info!(step = name, "running build step");
        let result = self.executor.run(cmd).await?;
        if !result.success() {
            return Err(PackageError::BuildFailed {
                step: name.to_string(),
                message: result.stderr,
            });
        }
        Ok(())
    }

    /// Extract, compile and install the sources, returning the produced package path
    ///
    /// # Errors
    /// Returns an error if extraction, dependency install or any build step fails
    #[instrument(skip(self, sources))]
    pub async fn build(&self, sources: &SourceArchives) -> Result<PathBuf, PackageError> {
        if self.build_dir.is_dir() {
            std::fs::remove_dir_all(&self.build_dir)?;
        }

        let nginx_src = archive::extract(&sources.nginx, &self.build_dir)?;
        let nps_src = archive::extract(&sources.pagespeed, &self.build_dir)?;
        let naxsi_src = archive::extract(&sources.naxsi, &self.build_dir)?;
        archive::extract(&sources.psol, &nps_src)?;

        let version = Self::version_of(&nginx_src).ok_or_else(|| PackageError::ArchiveError {
            path: sources.nginx.display().to_string(),
            message: "cannot read version from source directory".to_string(),
        })?;
        let arch = Self::arch();

        self.packages.install(BUILD_PACKAGES).await?;

        self.step(
            "configure",
            &Self::configure_command(&nginx_src, &nps_src, &naxsi_src),
        )
        .await?;
        self.step("make", &format!("cd {} && make > /dev/null", quote(&nginx_src)))
            .await?;
        self.step(
            "checkinstall",
            &format!(
                "cd {} && checkinstall --install=yes --fstrans=no --pkgname={PACKAGE_NAME} \
                 --pkgversion={version} --pkgrelease={PACKAGE_RELEASE} --pkgarch={arch} -y make install",
                quote(&nginx_src)
            ),
        )
        .await?;

        info!(version = %version, arch, "nginx built from source");

        Ok(nginx_src.join(format!(
            "{PACKAGE_NAME}_{version}-{PACKAGE_RELEASE}_{arch}.deb"
        )))
    }
}
