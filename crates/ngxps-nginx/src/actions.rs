//! `Actions` implementation for a real host

use std::sync::Arc;

use async_trait::async_trait;
use ngxps_core::{ActionError, Actions, ChangeDetector, SiteContext, UnitConfig};
use ngxps_exec::CommandExecutor;
use ngxps_pkg::{Artifacts, PackageManager};
use tracing::{debug, instrument};

use crate::dhparam;
use crate::install::Installer;
use crate::layout::Layout;
use crate::service::{InitSystem, Service};
use crate::sites::SiteDirectory;
use crate::templates::{self, CACHE_CONF, GLOBAL_FILES, Templates};
use crate::tmpfs::CacheMount;

/// nginx with pagespeed and naxsi, driven through host commands
pub struct NginxActions {
    executor: Arc<dyn CommandExecutor>,
    templates: Arc<Templates>,
    layout: Layout,
    installer: Installer,
    service: Service,
    sites: SiteDirectory,
    cache: CacheMount,
}

impl NginxActions {
    /// Wire up the host operations, probing the init system from `layout`
    ///
    /// # Errors
    /// Returns an error if the embedded templates do not parse
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        packages: Arc<dyn PackageManager>,
        layout: Layout,
    ) -> Result<Self, ActionError> {
        let init = InitSystem::detect(&layout);
        Self::with_init(executor, packages, layout, init)
    }

    /// Like `new`, with an explicit init system
    ///
    /// # Errors
    /// Returns an error if the embedded templates do not parse
    pub fn with_init(
        executor: Arc<dyn CommandExecutor>,
        packages: Arc<dyn PackageManager>,
        layout: Layout,
        init: InitSystem,
    ) -> Result<Self, ActionError> {
        let templates = Arc::new(Templates::new()?);
        debug!(init = %init, prefix = %layout.prefix.display(), "host actions ready");

        Ok(Self {
            installer: Installer::new(executor.clone(), packages, layout.clone()),
            service: Service::new(executor.clone(), templates.clone(), layout.clone(), init),
            sites: SiteDirectory::new(layout.sites_enabled()),
            cache: CacheMount::new(
                executor.clone(),
                &layout.cache_path,
                &layout.fstab,
                &layout.mounts,
            ),
            executor,
            templates,
            layout,
        })
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[must_use]
    pub fn init_system(&self) -> InitSystem {
        self.service.init_system()
    }
}

#[async_trait]
impl Actions for NginxActions {
    async fn install(
        &self,
        artifacts: &Artifacts,
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError> {
        self.installer.install(artifacts, detector).await
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: &UnitConfig) -> Result<bool, ActionError> {
        let data = templates::global_data(&self.layout, config)?;
        let conf_dir = self.layout.conf_dir();

        let mut changed = false;
        for (template, file) in GLOBAL_FILES {
            changed |= self
                .templates
                .render_to(template, &data, &conf_dir.join(file))?;
        }
        debug!(changed, "global configuration rendered");
        Ok(changed)
    }

    #[instrument(skip(self))]
    async fn set_cache(&self, peers: &[String]) -> Result<bool, ActionError> {
        let data = templates::cache_data(&self.layout, peers);
        self.templates
            .render_to(CACHE_CONF, &data, &self.layout.conf_dir().join("cache.conf"))
    }

    async fn validate_config(&self) -> Result<bool, ActionError> {
        self.service.validate().await
    }

    async fn create_tmpfs(&self, size_mb: u64) -> Result<(), ActionError> {
        self.cache.create(size_mb).await
    }

    async fn create_dh_key(&self, bits: u32) -> Result<(), ActionError> {
        dhparam::generate(self.executor.as_ref(), &self.layout.dhparams(), bits).await
    }

    async fn add_site(&self, site: &SiteContext) -> Result<(), ActionError> {
        self.sites.add(&self.templates, &self.layout, site)
    }

    async fn enable_sites(
        &self,
        names: &[String],
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError> {
        self.sites.enable(names, detector)
    }

    async fn enabled_sites(&self) -> Result<Vec<String>, ActionError> {
        self.sites.list()
    }

    async fn enable(&self) -> Result<bool, ActionError> {
        self.service.enable().await
    }

    async fn disable(&self) -> Result<bool, ActionError> {
        self.service.disable().await
    }

    async fn start(&self) -> Result<bool, ActionError> {
        self.service.lifecycle("start").await
    }

    async fn stop(&self) -> Result<bool, ActionError> {
        self.service.lifecycle("stop").await
    }

    async fn restart(&self) -> Result<bool, ActionError> {
        self.service.lifecycle("restart").await
    }

    async fn reload(&self) -> Result<bool, ActionError> {
        self.service.lifecycle("reload").await
    }

    async fn upgrade(&self) -> Result<bool, ActionError> {
        self.service.lifecycle("upgrade").await
    }

    async fn running(&self) -> Result<bool, ActionError> {
        self.service.running().await
    }
}
