mod common;

use std::path::PathBuf;
use std::sync::Arc;

use ngxps_core::flags;
use ngxps_core::status::{MSG_INVALID_CONFIG, MSG_RUNNING};
use ngxps_core::{
    ActionError, CoreError, Engine, HandlerId, JsonFileBackend, MemoryBackend, Severity,
    SiteContext, StaticEnvironment, Trigger, UnitConfig, UnitStore,
};

use common::{MockActions, TestEnvironment, with_deb};

// ============================================================================
// Helpers
// ============================================================================

fn site(name: &str) -> SiteContext {
    SiteContext::new(name, "/var/www")
}

fn engine(actions: &Arc<MockActions>, env: &Arc<TestEnvironment>, store: UnitStore) -> Engine {
    Engine::new(store, actions.clone(), env.clone())
}

const QUIESCENT: [&str; 6] = [
    flags::INSTALLED,
    flags::CONFIGURED,
    flags::DHE_READY,
    flags::TMPFS_READY,
    flags::CACHE_READY,
    flags::READY,
];

fn assert_quiescent(engine: &Engine) {
    for flag in QUIESCENT {
        assert!(engine.flags().is_set(flag), "{flag} should be set");
    }
    for flag in flags::PENDING {
        assert!(!engine.flags().is_set(flag), "{flag} should be clear");
    }
    assert!(
        !engine
            .flags()
            .iter()
            .any(|f| f.starts_with(flags::CONFIG_CHANGED)),
        "transient configuration flags left behind"
    );
}

/// Engine driven through a first install with the given environment
async fn installed_engine(
    env: StaticEnvironment,
) -> (Engine, Arc<MockActions>, Arc<TestEnvironment>) {
    let actions = MockActions::new();
    let env = TestEnvironment::new(with_deb(env));
    let mut engine = engine(&actions, &env, UnitStore::in_memory());

    engine.run(Trigger::Install).await.unwrap();
    assert_quiescent(&engine);
    actions.take_calls();

    (engine, actions, env)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_fresh_host_converges_in_one_pass() {
    let actions = MockActions::new();
    let env = TestEnvironment::new(with_deb(
        StaticEnvironment::default().with_sites(vec![site("site1")]),
    ));
    let mut engine = engine(&actions, &env, UnitStore::in_memory());

    let report = engine.run(Trigger::Install).await.unwrap();

    assert_quiescent(&engine);
    assert!(!report.halted);
    assert_eq!(actions.sites(), vec!["site1"]);

    let status = engine.status().unwrap();
    assert_eq!(status.severity, Severity::Active);
    assert_eq!(status.message, MSG_RUNNING);

    assert_eq!(
        report.fired,
        vec![
            HandlerId::Install,
            HandlerId::Configure,
            HandlerId::CreateTmpfs,
            HandlerId::CreateDhe,
            HandlerId::CacheAbsent,
            HandlerId::Start,
            HandlerId::SitesPresent,
            HandlerId::Status,
            HandlerId::ApplyPending,
        ]
    );
    assert_eq!(
        actions.calls(),
        vec![
            "install",
            "configure",
            "enable",
            "create_tmpfs:512",
            "create_dh_key:2048",
            "set_cache:",
            "start",
            "add_site:site1",
            "enable_sites:site1",
            "reload",
        ]
    );
}

#[tokio::test]
async fn test_tmpfs_resize_stops_and_starts() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;
    actions.with(|s| s.configure_changed = false);

    env.update(|e| e.config.tmpfs_size = 1024);
    engine.run(Trigger::ConfigChanged).await.unwrap();

    assert_eq!(
        actions.calls(),
        vec!["configure", "enable", "stop", "create_tmpfs:1024", "start"]
    );
    assert_quiescent(&engine);
    assert!(engine.flags().is_set(flags::TMPFS_READY));
    assert_eq!(engine.status().unwrap().message, MSG_RUNNING);
}

#[tokio::test]
async fn test_dhe_change_only_regenerates_key() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;
    actions.with(|s| s.configure_changed = false);

    env.update(|e| e.config.dhe_size = 4096);
    let report = engine.run(Trigger::ConfigChanged).await.unwrap();

    assert!(report.fired.contains(&HandlerId::CreateDhe));
    assert!(!report.fired.contains(&HandlerId::CreateTmpfs));
    assert_eq!(
        actions.calls(),
        vec!["configure", "enable", "stop", "create_dh_key:4096", "start"]
    );
}

#[tokio::test]
async fn test_template_variable_change_reloads() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;

    env.update(|e| {
        e.config = UnitConfig::default().with_var("ssl_protocols", "TLSv1.3");
    });
    let report = engine.run(Trigger::ConfigChanged).await.unwrap();

    assert_eq!(actions.calls(), vec!["configure", "enable", "reload"]);
    assert!(report.fired.contains(&HandlerId::ApplyPending));
    assert_quiescent(&engine);
}

#[tokio::test]
async fn test_failed_enable_keeps_the_reload() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;

    env.update(|e| {
        e.config = UnitConfig::default().with_var("ssl_protocols", "TLSv1.3");
    });
    actions.with(|s| s.fail_enable = true);
    let err = engine.run(Trigger::ConfigChanged).await.unwrap_err();
    assert!(matches!(err, CoreError::Action(ActionError::Exec(_))));
    assert!(engine.flags().is_set(flags::RELOAD));
    assert!(!actions.calls().contains(&"reload".to_string()));

    // The files are already on disk, so the retry renders nothing new
    actions.with(|s| {
        s.fail_enable = false;
        s.configure_changed = false;
    });
    actions.take_calls();
    engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(actions.calls(), vec!["configure", "enable", "reload"]);
    assert_quiescent(&engine);
}

#[tokio::test]
async fn test_unchanged_render_keeps_the_status() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;
    assert_eq!(engine.status().unwrap().message, MSG_RUNNING);

    env.update(|e| {
        e.config = UnitConfig::default().with_var("ssl_protocols", "TLSv1.3");
    });
    actions.with(|s| {
        s.configure_changed = false;
        s.fail_enable = true;
    });
    engine.run(Trigger::ConfigChanged).await.unwrap_err();

    assert_eq!(engine.status().unwrap().message, MSG_RUNNING);
    assert!(!engine.flags().is_set(flags::RELOAD));
}

#[tokio::test]
async fn test_relation_departed_installs_default_site() {
    let (mut engine, actions, env) = installed_engine(
        StaticEnvironment::default().with_sites(vec![site("site1"), site("site2")]),
    )
    .await;
    assert_eq!(actions.sites(), vec!["site1", "site2"]);

    env.update(|e| e.relations.web_engine = None);
    let report = engine.run(Trigger::WebEngineRelationDeparted).await.unwrap();

    assert_eq!(actions.sites(), vec!["default"]);
    assert_eq!(
        actions.calls(),
        vec!["add_site:default", "enable_sites:default", "reload"]
    );

    let absent = report
        .fired
        .iter()
        .position(|h| *h == HandlerId::SitesAbsent)
        .unwrap();
    let applied = report
        .fired
        .iter()
        .position(|h| *h == HandlerId::ApplyPending)
        .unwrap();
    assert!(absent < applied);
    assert!(!engine.flags().is_set(flags::WEB_ENGINE_AVAILABLE));
    assert_quiescent(&engine);
}

#[tokio::test]
async fn test_unchanged_relation_is_a_no_op() {
    let (mut engine, actions, _env) =
        installed_engine(StaticEnvironment::default().with_sites(vec![site("site1")])).await;

    engine.run(Trigger::WebEngineRelationChanged).await.unwrap();

    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn test_cache_peers_render_and_reload() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;

    env.update(|e| e.relations.cache = Some(vec!["10.0.0.5:11211".to_string()]));
    engine.run(Trigger::CacheRelationChanged).await.unwrap();

    assert!(engine.flags().is_set(flags::CACHE_AVAILABLE));
    assert_eq!(actions.take_calls(), vec!["set_cache:10.0.0.5:11211", "reload"]);

    env.update(|e| e.relations.cache = None);
    engine.run(Trigger::CacheRelationDeparted).await.unwrap();

    assert!(!engine.flags().is_set(flags::CACHE_AVAILABLE));
    assert_eq!(actions.take_calls(), vec!["set_cache:", "reload"]);
    assert_quiescent(&engine);
}

// ============================================================================
// Pending actions
// ============================================================================

#[tokio::test]
async fn test_restart_wins_over_upgrade_and_reload() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;

    for flag in flags::PENDING {
        engine.store_mut().flags.set(flag);
    }
    engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(actions.calls(), vec!["restart"]);
    for flag in flags::PENDING {
        assert!(!engine.flags().is_set(flag));
    }
}

#[tokio::test]
async fn test_upgrade_wins_over_reload() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;

    engine.store_mut().flags.set(flags::RELOAD);
    engine.store_mut().flags.set(flags::UPGRADE);
    engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(actions.calls(), vec!["upgrade"]);
}

#[tokio::test]
async fn test_reload_only_clears_all_pending() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;

    engine.store_mut().flags.set(flags::RELOAD);
    let report = engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(actions.calls(), vec!["reload"]);
    assert!(report.fired.contains(&HandlerId::ApplyPending));
    for flag in flags::PENDING {
        assert!(!engine.flags().is_set(flag));
    }
}

#[tokio::test]
async fn test_failed_pending_action_keeps_flags() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;
    actions.with(|s| s.lifecycle_ok = false);

    engine.store_mut().flags.set(flags::RELOAD);
    engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(actions.take_calls(), vec!["reload"]);
    assert!(engine.flags().is_set(flags::RELOAD));

    // Retried on the next pass
    actions.with(|s| s.lifecycle_ok = true);
    engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(actions.calls(), vec!["reload"]);
    assert!(!engine.flags().is_set(flags::RELOAD));
}

// ============================================================================
// Ordering, failures and blocking
// ============================================================================

#[tokio::test]
async fn test_firing_order_ignores_flag_set_order() {
    let actions = MockActions::new();
    let env = TestEnvironment::new(StaticEnvironment::default());
    let mut store = UnitStore::in_memory();
    for flag in [
        flags::CONFIGURE,
        flags::CACHE_READY,
        flags::TMPFS_READY,
        flags::DHE_READY,
        flags::CONFIGURED,
        flags::INSTALLED,
    ] {
        store.flags.set(flag);
    }
    let mut engine = engine(&actions, &env, store);

    let report = engine.run(Trigger::UpdateStatus).await.unwrap();

    assert_eq!(
        report.fired,
        vec![
            HandlerId::Configure,
            HandlerId::CreateTmpfs,
            HandlerId::CreateDhe,
            HandlerId::Start,
            HandlerId::SitesAbsent,
            HandlerId::CacheAbsent,
            HandlerId::Status,
            HandlerId::ApplyPending,
        ]
    );
    assert_quiescent(&engine);
}

#[tokio::test]
async fn test_failed_action_leaves_no_partial_success() {
    let actions = MockActions::new();
    actions.with(|s| s.fail_dh = true);
    let env = TestEnvironment::new(with_deb(StaticEnvironment::default()));
    let backend = MemoryBackend::new();
    let store = UnitStore::open(Box::new(backend.clone())).unwrap();
    let mut engine = engine(&actions, &env, store);

    let err = engine.run(Trigger::Install).await.unwrap_err();
    assert!(matches!(err, CoreError::Action(ActionError::Exec(_))));

    assert!(engine.flags().is_set(flags::INSTALLED));
    assert!(engine.flags().is_set(flags::TMPFS_READY));
    assert!(!engine.flags().is_set(flags::DHE_READY));
    assert!(!engine.flags().is_set(flags::READY));
    assert!(engine.flags().is_set(&flags::config_changed("dhe_size")));
    assert!(!actions.calls().contains(&"start".to_string()));

    // The persisted document matches the in-memory flags
    let persisted = UnitStore::open(Box::new(backend)).unwrap();
    assert_eq!(persisted.flags.to_vec(), engine.flags().to_vec());

    // The retained flags let the next pass finish the work
    actions.with(|s| s.fail_dh = false);
    actions.take_calls();
    engine.run(Trigger::UpdateStatus).await.unwrap();

    assert!(actions.calls().contains(&"create_dh_key:2048".to_string()));
    assert_quiescent(&engine);
}

#[tokio::test]
async fn test_missing_resources_block() {
    let actions = MockActions::new();
    let env = TestEnvironment::new(StaticEnvironment::default());
    let mut engine = engine(&actions, &env, UnitStore::in_memory());

    let report = engine.run(Trigger::Install).await.unwrap();

    assert!(report.halted);
    assert!(report.fired.is_empty());
    assert!(engine.flags().is_empty());
    assert!(engine.store().detector.baseline("config").is_none());
    assert!(actions.calls().is_empty());

    let status = engine.status().unwrap();
    assert_eq!(status.severity, Severity::Blocked);
    assert_eq!(
        status.message,
        "missing resources: ngxps_deb, nginx, ngx_pagespeed, psol, naxsi"
    );

    // Still quiescent on unrelated triggers
    let report = engine.run(Trigger::ConfigChanged).await.unwrap();
    assert!(report.halted);
    assert!(engine.flags().is_empty());

    // Resources appear with the next upgrade
    env.update(|e| *e = with_deb(e.clone()));
    engine.run(Trigger::UpgradeCharm).await.unwrap();
    assert_quiescent(&engine);
    assert_eq!(engine.status().unwrap().severity, Severity::Active);
}

#[tokio::test]
async fn test_partial_sources_report_only_missing() {
    let actions = MockActions::new();
    let env = TestEnvironment::new(
        StaticEnvironment::default()
            .with_resource("nginx", "/srv/nginx-1.10.1.tar.gz")
            .with_resource("psol", "/srv/psol.tar.gz"),
    );
    let mut engine = engine(&actions, &env, UnitStore::in_memory());

    engine.run(Trigger::Install).await.unwrap();

    assert_eq!(
        engine.status().unwrap().message,
        "missing resources: ngx_pagespeed, naxsi"
    );
}

#[tokio::test]
async fn test_reinstall_with_same_artifacts_is_a_no_op() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;
    actions.with(|s| s.configure_changed = false);

    engine.run(Trigger::UpgradeCharm).await.unwrap();

    assert_eq!(actions.with(|s| s.installs), 1);
    assert_eq!(actions.calls(), vec!["configure", "enable"]);
    assert!(!engine.flags().is_set(flags::UPGRADE));
}

#[tokio::test]
async fn test_new_artifacts_upgrade() {
    let (mut engine, actions, env) = installed_engine(StaticEnvironment::default()).await;
    actions.with(|s| s.configure_changed = false);

    env.update(|e| {
        e.resources.insert(
            "ngxps_deb".to_string(),
            PathBuf::from("/srv/resources/nginx_1.11.0-1_amd64.deb"),
        );
    });
    engine.run(Trigger::UpgradeCharm).await.unwrap();

    assert_eq!(actions.calls(), vec!["install", "configure", "enable", "upgrade"]);
    assert_quiescent(&engine);
}

// ============================================================================
// Status and lifecycle
// ============================================================================

#[tokio::test]
async fn test_invalid_config_keeps_ready() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;
    actions.with(|s| s.valid = false);

    engine.run(Trigger::UpdateStatus).await.unwrap();

    let status = engine.status().unwrap();
    assert_eq!(status.severity, Severity::Maintenance);
    assert_eq!(status.message, MSG_INVALID_CONFIG);
    assert!(engine.flags().is_set(flags::READY));
    assert!(actions.calls().is_empty());
}

#[tokio::test]
async fn test_failed_start_leaves_ready_unset() {
    let actions = MockActions::new();
    actions.with(|s| s.start_ok = false);
    let env = TestEnvironment::new(with_deb(StaticEnvironment::default()));
    let mut engine = engine(&actions, &env, UnitStore::in_memory());

    engine.run(Trigger::Install).await.unwrap();

    assert!(!engine.flags().is_set(flags::READY));
    assert_eq!(engine.status().unwrap().message, "nginx failed to start");
    let starts = actions.calls().iter().filter(|c| *c == "start").count();
    assert_eq!(starts, 1);
}

#[tokio::test]
async fn test_stop_tears_down() {
    let (mut engine, actions, _env) = installed_engine(StaticEnvironment::default()).await;

    let report = engine.run(Trigger::Stop).await.unwrap();

    assert_eq!(report.fired[0], HandlerId::Teardown);
    assert!(!report.fired.contains(&HandlerId::Start));
    assert_eq!(actions.calls(), vec!["stop", "disable"]);
    assert!(!engine.flags().is_set(flags::READY));
    assert!(!engine.flags().is_set(flags::CONFIGURED));
    assert_eq!(engine.status().unwrap().message, "nginx stopped");
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unit.json");
    let actions = MockActions::new();
    let env = TestEnvironment::new(with_deb(
        StaticEnvironment::default().with_sites(vec![site("site1")]),
    ));

    let store = UnitStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
    let mut first = engine(&actions, &env, store);
    first.run(Trigger::Install).await.unwrap();
    drop(first);
    actions.take_calls();

    let store = UnitStore::open(Box::new(JsonFileBackend::new(&path))).unwrap();
    let mut second = engine(&actions, &env, store);
    assert_quiescent(&second);

    second.run(Trigger::UpdateStatus).await.unwrap();

    assert!(actions.calls().is_empty());
    assert_eq!(second.status().unwrap().message, MSG_RUNNING);
}
