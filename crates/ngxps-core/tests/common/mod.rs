//! Mock collaborators shared by the integration tests
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ngxps_core::detector::keys;
use ngxps_core::{
    ActionError, Actions, ChangeDetector, CoreError, SiteContext, StaticEnvironment,
    UnitConfig, UnitEnvironment,
};
use ngxps_pkg::Artifacts;

pub struct MockState {
    pub running: bool,
    pub valid: bool,
    pub start_ok: bool,
    pub lifecycle_ok: bool,
    pub configure_changed: bool,
    pub fail_dh: bool,
    pub fail_enable: bool,
    pub installs: usize,
    pub sites: BTreeSet<String>,
    pub calls: Vec<String>,
}

pub struct MockActions {
    state: Mutex<MockState>,
}

impl MockActions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                running: false,
                valid: true,
                start_ok: true,
                lifecycle_ok: true,
                configure_changed: true,
                fail_dh: false,
                fail_enable: false,
                installs: 0,
                sites: BTreeSet::new(),
                calls: Vec::new(),
            }),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn record(&self, call: impl Into<String>) {
        self.with(|s| s.calls.push(call.into()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn take_calls(&self) -> Vec<String> {
        self.with(|s| std::mem::take(&mut s.calls))
    }

    pub fn sites(&self) -> Vec<String> {
        self.with(|s| s.sites.iter().cloned().collect())
    }
}

#[async_trait]
impl Actions for MockActions {
    async fn install(
        &self,
        artifacts: &Artifacts,
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError> {
        let identity = format!("{artifacts:?}");
        if !detector.peek(keys::ARTIFACTS, &identity)? {
            return Ok(false);
        }
        self.record("install");
        self.with(|s| s.installs += 1);
        detector.commit(keys::ARTIFACTS, &identity)?;
        Ok(true)
    }

    async fn configure(&self, _config: &UnitConfig) -> Result<bool, ActionError> {
        self.record("configure");
        Ok(self.with(|s| s.configure_changed))
    }

    async fn set_cache(&self, peers: &[String]) -> Result<bool, ActionError> {
        self.record(format!("set_cache:{}", peers.join(",")));
        Ok(true)
    }

    async fn validate_config(&self) -> Result<bool, ActionError> {
        Ok(self.with(|s| s.valid))
    }

    async fn create_tmpfs(&self, size_mb: u64) -> Result<(), ActionError> {
        self.record(format!("create_tmpfs:{size_mb}"));
        Ok(())
    }

    async fn create_dh_key(&self, bits: u32) -> Result<(), ActionError> {
        self.record(format!("create_dh_key:{bits}"));
        if self.with(|s| s.fail_dh) {
            return Err(ActionError::Exec("openssl dhparam exited with 1".to_string()));
        }
        Ok(())
    }

    async fn add_site(&self, site: &SiteContext) -> Result<(), ActionError> {
        self.record(format!("add_site:{}", site.service_name));
        self.with(|s| s.sites.insert(site.service_name.clone()));
        Ok(())
    }

    async fn enable_sites(
        &self,
        names: &[String],
        detector: &mut ChangeDetector,
    ) -> Result<bool, ActionError> {
        self.record(format!("enable_sites:{}", names.join(",")));
        let sites = self.with(|s| {
            s.sites.retain(|site| names.contains(site));
            s.sites.clone()
        });
        Ok(detector.changed(keys::SITES_FILES, &sites)?)
    }

    async fn enabled_sites(&self) -> Result<Vec<String>, ActionError> {
        Ok(self.sites())
    }

    async fn enable(&self) -> Result<bool, ActionError> {
        self.record("enable");
        if self.with(|s| s.fail_enable) {
            return Err(ActionError::Exec("systemctl enable exited with 1".to_string()));
        }
        Ok(true)
    }

    async fn disable(&self) -> Result<bool, ActionError> {
        self.record("disable");
        Ok(true)
    }

    async fn start(&self) -> Result<bool, ActionError> {
        self.record("start");
        Ok(self.with(|s| {
            s.running = s.start_ok;
            s.start_ok
        }))
    }

    async fn stop(&self) -> Result<bool, ActionError> {
        self.record("stop");
        self.with(|s| s.running = false);
        Ok(true)
    }

    async fn restart(&self) -> Result<bool, ActionError> {
        self.record("restart");
        Ok(self.with(|s| s.lifecycle_ok))
    }

    async fn reload(&self) -> Result<bool, ActionError> {
        self.record("reload");
        Ok(self.with(|s| s.lifecycle_ok))
    }

    async fn upgrade(&self) -> Result<bool, ActionError> {
        self.record("upgrade");
        Ok(self.with(|s| s.lifecycle_ok))
    }

    async fn running(&self) -> Result<bool, ActionError> {
        Ok(self.with(|s| s.running))
    }
}

/// Environment whose inputs can change between passes
pub struct TestEnvironment {
    inner: Mutex<StaticEnvironment>,
}

impl TestEnvironment {
    pub fn new(env: StaticEnvironment) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(env),
        })
    }

    pub fn update(&self, f: impl FnOnce(&mut StaticEnvironment)) {
        f(&mut self.inner.lock().unwrap());
    }
}

impl UnitEnvironment for TestEnvironment {
    fn config(&self) -> Result<UnitConfig, CoreError> {
        self.inner.lock().unwrap().config()
    }

    fn site_contexts(&self) -> Option<Vec<SiteContext>> {
        self.inner.lock().unwrap().site_contexts()
    }

    fn cache_peers(&self) -> Option<Vec<String>> {
        self.inner.lock().unwrap().cache_peers()
    }

    fn resource(&self, name: &str) -> Option<PathBuf> {
        self.inner.lock().unwrap().resource(name)
    }
}

pub fn with_deb(env: StaticEnvironment) -> StaticEnvironment {
    env.with_resource("ngxps_deb", "/srv/resources/nginx_1.10.1-1_amd64.deb")
}
