//! Reconciliation engine
//!
//! A pass starts from one trigger. The environment is read once, the
//! transient `config.changed*` flags and the relation availability flags are
//! derived from it, then the handler table is swept in priority order. A
//! handler that already fired in this pass becomes eligible again only when a
//! flag its guard reads changed after it ran, so a `reload` raised by a late
//! handler is still applied before the pass ends. Hook handlers fire at most
//! once. The pass ends with a sweep in which nothing fired.

use std::collections::HashMap;
use std::sync::Arc;

use kameo_macros::Reply;
use ngxps_pkg::Artifacts;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::actions::{Actions, while_stopped};
use crate::config::{DHE_SIZE, SiteContext, TMPFS_SIZE, UnitConfig};
use crate::detector::keys;
use crate::environment::UnitEnvironment;
use crate::error::CoreError;
use crate::flags::{self, FlagStore};
use crate::guard::Guard;
use crate::status::{Severity, UnitStatus, service_status};
use crate::store::UnitStore;
use crate::trigger::Trigger;

/// Sweeps allowed before a pass is declared non-convergent
pub const DEFAULT_MAX_SWEEPS: usize = 8;

/// Handlers in the reconciliation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerId {
    Teardown,
    Install,
    Configure,
    CreateTmpfs,
    CreateDhe,
    Start,
    ApplyPending,
    SitesAbsent,
    SitesPresent,
    CacheAbsent,
    CachePresent,
    Status,
}

impl HandlerId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HandlerId::Teardown => "teardown",
            HandlerId::Install => "install",
            HandlerId::Configure => "configure",
            HandlerId::CreateTmpfs => "create-tmpfs",
            HandlerId::CreateDhe => "create-dhe",
            HandlerId::Start => "start",
            HandlerId::ApplyPending => "apply-pending",
            HandlerId::SitesAbsent => "sites-absent",
            HandlerId::SitesPresent => "sites-present",
            HandlerId::CacheAbsent => "cache-absent",
            HandlerId::CachePresent => "cache-present",
            HandlerId::Status => "status",
        }
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the handler table
#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub id: HandlerId,
    /// Triggers the handler is bound to; empty for flag-driven handlers
    pub hooks: &'static [Trigger],
    pub guard: Guard,
}

impl HandlerSpec {
    fn on_hooks(id: HandlerId, hooks: &'static [Trigger]) -> Self {
        Self {
            id,
            hooks,
            guard: Guard::Always,
        }
    }

    fn on_flags(id: HandlerId, guard: Guard) -> Self {
        Self {
            id,
            hooks: &[],
            guard,
        }
    }

    /// Whether the handler may fire for `trigger` with the current flags
    #[must_use]
    pub fn applies(&self, trigger: Trigger, flags: &FlagStore) -> bool {
        (self.hooks.is_empty() || self.hooks.contains(&trigger)) && self.guard.holds(flags)
    }
}

/// The handler table, highest priority first
#[must_use]
pub fn handler_table() -> Vec<HandlerSpec> {
    use flags::{
        CACHE_AVAILABLE, CACHE_READY, CONFIG_CHANGED, CONFIGURE, CONFIGURED, DHE_READY,
        INSTALLED, PENDING, READY, TMPFS_READY, WEB_ENGINE_AVAILABLE,
    };

    vec![
        HandlerSpec::on_hooks(HandlerId::Teardown, &[Trigger::Stop]),
        HandlerSpec::on_hooks(
            HandlerId::Install,
            &[Trigger::Install, Trigger::UpgradeCharm],
        ),
        HandlerSpec::on_flags(
            HandlerId::Configure,
            Guard::any_of([CONFIG_CHANGED, CONFIGURE]),
        ),
        HandlerSpec::on_flags(
            HandlerId::CreateTmpfs,
            Guard::all_of([flags::config_changed(TMPFS_SIZE)]),
        ),
        HandlerSpec::on_flags(
            HandlerId::CreateDhe,
            Guard::all_of([flags::config_changed(DHE_SIZE)]),
        ),
        HandlerSpec::on_flags(
            HandlerId::Start,
            Guard::all_of([INSTALLED, CONFIGURED, DHE_READY, TMPFS_READY, CACHE_READY])
                .and(Guard::none_of([READY])),
        ),
        HandlerSpec::on_flags(
            HandlerId::ApplyPending,
            Guard::all_of([READY]).and(Guard::any_of(PENDING)),
        ),
        HandlerSpec::on_flags(
            HandlerId::SitesAbsent,
            Guard::all_of([READY]).and(Guard::none_of([WEB_ENGINE_AVAILABLE])),
        ),
        HandlerSpec::on_flags(
            HandlerId::SitesPresent,
            Guard::all_of([READY, WEB_ENGINE_AVAILABLE]),
        ),
        HandlerSpec::on_flags(HandlerId::CacheAbsent, Guard::none_of([CACHE_AVAILABLE])),
        HandlerSpec::on_flags(HandlerId::CachePresent, Guard::all_of([CACHE_AVAILABLE])),
        HandlerSpec::on_flags(HandlerId::Status, Guard::all_of([READY])),
    ]
}

/// Lifecycle action chosen from the pending flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    Restart,
    Upgrade,
    Reload,
}

impl PendingAction {
    /// Highest-priority pending action: restart, then upgrade, then reload
    #[must_use]
    pub fn select(flags: &FlagStore) -> Option<Self> {
        [
            PendingAction::Restart,
            PendingAction::Upgrade,
            PendingAction::Reload,
        ]
        .into_iter()
        .find(|action| flags.is_set(action.flag()))
    }

    #[must_use]
    pub fn flag(self) -> &'static str {
        match self {
            PendingAction::Restart => flags::RESTART,
            PendingAction::Upgrade => flags::UPGRADE,
            PendingAction::Reload => flags::RELOAD,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            PendingAction::Restart => "restart",
            PendingAction::Upgrade => "upgrade",
            PendingAction::Reload => "reload",
        }
    }

    fn progress(self) -> &'static str {
        match self {
            PendingAction::Restart => "restarting nginx",
            PendingAction::Upgrade => "upgrading nginx",
            PendingAction::Reload => "reloading nginx",
        }
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, Serialize, Reply)]
pub struct PassReport {
    pub trigger: Trigger,
    /// Handlers in firing order, repeated when re-armed
    pub fired: Vec<HandlerId>,
    pub sweeps: usize,
    /// The pass stopped early to wait for operator input
    pub halted: bool,
    /// Flags after the pass
    pub flags: Vec<String>,
    pub status: Option<UnitStatus>,
}

/// Inputs read once at the start of a pass
struct PassInputs {
    config: UnitConfig,
    sites: Option<Vec<SiteContext>>,
    peers: Option<Vec<String>>,
}

#[derive(Default)]
struct Progress {
    fired: Vec<HandlerId>,
    sweeps: usize,
    halted: bool,
}

enum Flow {
    Continue,
    Halt,
}

/// Drives the handler table against the unit store
pub struct Engine {
    store: UnitStore,
    actions: Arc<dyn Actions>,
    env: Arc<dyn UnitEnvironment>,
    handlers: Vec<HandlerSpec>,
    max_sweeps: usize,
}

impl Engine {
    pub fn new(store: UnitStore, actions: Arc<dyn Actions>, env: Arc<dyn UnitEnvironment>) -> Self {
        Self {
            store,
            actions,
            env,
            handlers: handler_table(),
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }

    #[must_use]
    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps.max(1);
        self
    }

    #[must_use]
    pub fn flags(&self) -> &FlagStore {
        &self.store.flags
    }

    #[must_use]
    pub fn status(&self) -> Option<&UnitStatus> {
        self.store.status.current()
    }

    #[must_use]
    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut UnitStore {
        &mut self.store
    }

    #[must_use]
    pub fn handlers(&self) -> &[HandlerSpec] {
        &self.handlers
    }

    /// Persist the store
    ///
    /// # Errors
    /// Returns an error if the backend write fails
    pub fn flush(&self) -> Result<(), CoreError> {
        self.store.flush()
    }

    /// Run one reconciliation pass for `trigger`
    ///
    /// The store is flushed after every handler. On error the transient
    /// configuration flags stay set, so the next pass retries the work.
    ///
    /// # Errors
    /// Returns the first handler error, or `NoConvergence`
    #[instrument(skip(self))]
    pub async fn run(&mut self, trigger: Trigger) -> Result<PassReport, CoreError> {
        info!("reconciliation pass started");

        match self.drive(trigger).await {
            Ok(progress) => {
                if !progress.halted {
                    self.store.flags.clear_namespace(flags::CONFIG_CHANGED);
                }
                self.store.flush()?;
                info!(
                    fired = progress.fired.len(),
                    sweeps = progress.sweeps,
                    halted = progress.halted,
                    "reconciliation pass finished"
                );
                Ok(self.report(trigger, progress))
            }
            Err(e) => {
                error!(error = %e, "reconciliation pass failed");
                if let Err(flush_err) = self.store.flush() {
                    warn!(error = %flush_err, "failed to persist unit state");
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, trigger: Trigger) -> Result<Progress, CoreError> {
        let mut progress = Progress::default();

        // Nothing advances on a unit that has never been installed and
        // cannot be.
        if trigger != Trigger::Stop
            && !self.store.flags.is_set(flags::INSTALLED)
            && let Err(missing) = self.artifacts()
        {
            self.block(&missing);
            progress.halted = true;
            return Ok(progress);
        }

        let inputs = if trigger == Trigger::Stop {
            self.read_inputs()?
        } else {
            self.prepare()?
        };

        let mut fired_at: HashMap<HandlerId, u64> = HashMap::new();
        while progress.sweeps < self.max_sweeps {
            progress.sweeps += 1;
            let mut fired_any = false;

            for index in 0..self.handlers.len() {
                if !self.eligible(index, trigger, &fired_at) {
                    continue;
                }

                let id = self.handlers[index].id;
                info!(handler = %id, sweep = progress.sweeps, "firing handler");
                let flow = self.fire(id, &inputs).await?;

                fired_at.insert(id, self.store.flags.generation());
                progress.fired.push(id);
                fired_any = true;
                self.store.flush()?;

                if let Flow::Halt = flow {
                    progress.halted = true;
                    return Ok(progress);
                }
            }

            if !fired_any {
                return Ok(progress);
            }
        }

        Err(CoreError::NoConvergence {
            sweeps: self.max_sweeps,
        })
    }

    fn eligible(&self, index: usize, trigger: Trigger, fired_at: &HashMap<HandlerId, u64>) -> bool {
        let spec = &self.handlers[index];
        if !spec.applies(trigger, &self.store.flags) {
            return false;
        }

        match fired_at.get(&spec.id) {
            None => true,
            Some(_) if !spec.hooks.is_empty() => false,
            Some(&at) => self.store.flags.last_touched(spec.guard.flags()) > at,
        }
    }

    fn read_inputs(&self) -> Result<PassInputs, CoreError> {
        Ok(PassInputs {
            config: self.env.config()?,
            sites: self.env.site_contexts(),
            peers: self.env.cache_peers(),
        })
    }

    /// Read the environment and derive the per-pass flags
    fn prepare(&mut self) -> Result<PassInputs, CoreError> {
        let inputs = self.read_inputs()?;

        let entries = inputs.config.entries()?;
        for (key, value) in &entries {
            if self.store.detector.changed(&keys::config_key(key), value)? {
                debug!(key = %key, "configuration key changed");
                self.store.flags.set(flags::config_changed(key));
            }
        }
        if self.store.detector.changed(keys::CONFIG, &entries)? {
            self.store.flags.set(flags::CONFIG_CHANGED);
        }

        self.store.flags.toggle(
            flags::WEB_ENGINE_AVAILABLE,
            inputs.sites.as_ref().is_some_and(|sites| !sites.is_empty()),
        );
        self.store.flags.toggle(
            flags::CACHE_AVAILABLE,
            inputs.peers.as_ref().is_some_and(|peers| !peers.is_empty()),
        );

        Ok(inputs)
    }

    fn artifacts(&self) -> Result<Artifacts, Vec<String>> {
        Artifacts::resolve(|name| self.env.resource(name))
    }

    fn block(&mut self, missing: &[String]) {
        warn!(missing = ?missing, "install resources missing");
        self.store
            .status
            .set(Severity::Blocked, format!("missing resources: {}", missing.join(", ")));
    }

    async fn fire(&mut self, id: HandlerId, inputs: &PassInputs) -> Result<Flow, CoreError> {
        match id {
            HandlerId::Install => return self.install().await,
            HandlerId::Teardown => self.teardown().await?,
            HandlerId::Configure => self.configure(&inputs.config).await?,
            HandlerId::CreateTmpfs => self.create_tmpfs(inputs.config.tmpfs_size).await?,
            HandlerId::CreateDhe => self.create_dhe(inputs.config.dhe_size).await?,
            HandlerId::Start => self.start().await?,
            HandlerId::ApplyPending => self.apply_pending().await?,
            HandlerId::SitesAbsent => self.sites(&[SiteContext::default_site()], &[]).await?,
            HandlerId::SitesPresent => {
                let contexts = inputs.sites.as_deref().unwrap_or(&[]);
                self.sites(contexts, contexts).await?;
            }
            HandlerId::CacheAbsent => self.cache(&[]).await?,
            HandlerId::CachePresent => self.cache(inputs.peers.as_deref().unwrap_or(&[])).await?,
            HandlerId::Status => self.update_status().await?,
        }
        Ok(Flow::Continue)
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        self.store.status.set(Severity::Maintenance, "stopping nginx");

        if self.actions.running().await? && !self.actions.stop().await? {
            return Err(CoreError::Service {
                action: "stop".to_string(),
            });
        }
        self.actions.disable().await?;

        let state = &mut self.store.flags;
        state.clear(flags::READY);
        state.clear(flags::CONFIGURED);
        state.clear(flags::CONFIGURE);
        state.clear_namespace(flags::CONFIG_CHANGED);
        for flag in flags::PENDING {
            state.clear(flag);
        }

        self.store.status.set(Severity::Maintenance, "nginx stopped");
        Ok(())
    }

    async fn install(&mut self) -> Result<Flow, CoreError> {
        let artifacts = match self.artifacts() {
            Ok(artifacts) => artifacts,
            Err(missing) => {
                self.block(&missing);
                return Ok(Flow::Halt);
            }
        };

        self.store.status.set(Severity::Maintenance, "installing nginx");
        let changed = self
            .actions
            .install(&artifacts, &mut self.store.detector)
            .await?;

        self.store.flags.set(flags::INSTALLED);
        if changed {
            info!("nginx installed");
            self.store.flags.set(flags::UPGRADE);
        }
        self.store.flags.set(flags::CONFIGURE);
        Ok(Flow::Continue)
    }

    async fn configure(&mut self, config: &UnitConfig) -> Result<(), CoreError> {
        // Reload is recorded before enable so a failed enable cannot drop it
        if self.actions.configure(config).await? {
            self.store.status.set(Severity::Maintenance, "configuring nginx");
            self.store.flags.set(flags::RELOAD);
        }
        self.actions.enable().await?;

        self.store.flags.set(flags::CONFIGURED);
        self.store.flags.clear(flags::CONFIGURE);
        Ok(())
    }

    async fn create_tmpfs(&mut self, size_mb: u64) -> Result<(), CoreError> {
        self.store.status.set(Severity::Maintenance, "creating cache");
        while_stopped(self.actions.as_ref(), self.actions.create_tmpfs(size_mb)).await?;
        self.store.flags.set(flags::TMPFS_READY);
        Ok(())
    }

    async fn create_dhe(&mut self, bits: u32) -> Result<(), CoreError> {
        self.store.status.set(Severity::Maintenance, "creating dhe");
        while_stopped(self.actions.as_ref(), self.actions.create_dh_key(bits)).await?;
        self.store.flags.set(flags::DHE_READY);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), CoreError> {
        self.store.status.set(Severity::Maintenance, "starting nginx");

        if !self.actions.start().await? {
            warn!("nginx failed to start");
            self.store
                .status
                .set(Severity::Maintenance, "nginx failed to start");
            return Ok(());
        }

        self.store.flags.set(flags::READY);
        for flag in flags::PENDING {
            self.store.flags.clear(flag);
        }
        self.update_status().await
    }

    async fn apply_pending(&mut self) -> Result<(), CoreError> {
        let Some(action) = PendingAction::select(&self.store.flags) else {
            return Ok(());
        };

        self.store.status.set(Severity::Maintenance, action.progress());
        let ok = match action {
            PendingAction::Restart => self.actions.restart().await?,
            PendingAction::Upgrade => self.actions.upgrade().await?,
            PendingAction::Reload => self.actions.reload().await?,
        };

        if !ok {
            warn!(action = action.verb(), "pending action failed, keeping flags");
            self.store
                .status
                .set(Severity::Maintenance, format!("nginx {} failed", action.verb()));
            return Ok(());
        }

        for flag in flags::PENDING {
            self.store.flags.clear(flag);
        }
        self.update_status().await
    }

    /// Render `sites` and enable exactly them when `contexts` moved
    async fn sites(&mut self, sites: &[SiteContext], contexts: &[SiteContext]) -> Result<(), CoreError> {
        if !self.store.detector.peek(keys::WEB_ENGINE_CONTEXTS, contexts)? {
            return Ok(());
        }

        let mut names = Vec::with_capacity(sites.len());
        for site in sites {
            if !site.has_valid_name() {
                warn!(service_name = %site.service_name, "skipping site with unusable name");
                continue;
            }
            self.actions.add_site(site).await?;
            names.push(site.service_name.clone());
        }

        let changed = self
            .actions
            .enable_sites(&names, &mut self.store.detector)
            .await?;
        if changed {
            self.store.flags.set(flags::RELOAD);
        }

        self.store.detector.commit(keys::WEB_ENGINE_CONTEXTS, contexts)?;
        Ok(())
    }

    async fn cache(&mut self, peers: &[String]) -> Result<(), CoreError> {
        if self.store.detector.peek(keys::CACHE_PEERS, peers)? {
            let changed = self.actions.set_cache(peers).await?;
            if changed {
                self.store.flags.set(flags::RELOAD);
            }
            self.store.detector.commit(keys::CACHE_PEERS, peers)?;
        }

        self.store.flags.set(flags::CACHE_READY);
        Ok(())
    }

    async fn update_status(&mut self) -> Result<(), CoreError> {
        let valid = self.actions.validate_config().await?;
        if !valid {
            warn!("nginx configuration failed validation");
        }
        let running = valid && self.actions.running().await?;

        let (severity, message) = service_status(running, valid);
        self.store.status.set(severity, message);
        Ok(())
    }

    fn report(&self, trigger: Trigger, progress: Progress) -> PassReport {
        PassReport {
            trigger,
            fired: progress.fired,
            sweeps: progress.sweeps,
            halted: progress.halted,
            flags: self.store.flags.to_vec(),
            status: self.store.status.current().cloned(),
        }
    }
}
