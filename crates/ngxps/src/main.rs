//! ngxps
//!
//! Runs reconciliation passes for an nginx + pagespeed + naxsi unit and
//! reports the unit's flags and status.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use kameo::actor::{ActorRef, Spawn};
use kameo::error::SendError;
use ngxps_core::{
    Actions, GetFlags, GetStatus, JsonFileBackend, RunHook, StateBackend, Trigger, UnitActor,
    UnitActorArgs,
};
use tracing_subscriber::EnvFilter;

mod config;
mod factory;

use config::{Config, DaemonConfig, LogFormat};

#[derive(Parser)]
#[command(name = "ngxps")]
#[command(about = "Reconciliation engine for nginx with pagespeed and naxsi", long_about = None)]
struct Cli {
    /// Configuration file (default: NGXPS_CONFIG or the standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass for a hook
    Hook {
        /// install, upgrade-charm, config-changed, update-status, stop,
        /// web-engine-relation-{changed,departed}, cache-relation-{changed,departed}
        name: String,
    },
    /// List the flags currently set
    Flags,
    /// Show the displayed unit status
    Status,
}

fn init_tracing(daemon: &DaemonConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&daemon.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match daemon.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Spawn the unit actor over the persisted state and wait until it has loaded it
async fn spawn_unit(config: &Config, actions: Arc<dyn Actions>) -> Result<ActorRef<UnitActor>> {
    let environment = Arc::new(config.environment()?);
    let backend: Box<dyn StateBackend> = Box::new(JsonFileBackend::new(config.state_file()));

    let unit = UnitActor::spawn(UnitActorArgs {
        backend,
        actions,
        environment,
    });
    unit.wait_for_startup_result()
        .await
        .map_err(|e| eyre::eyre!("unit actor failed to start: {e}"))?;
    Ok(unit)
}

/// Answer `command` with an already running unit actor, one line per output item
async fn dispatch(unit: &ActorRef<UnitActor>, command: Commands) -> Result<Vec<String>> {
    match command {
        Commands::Hook { name } => {
            let trigger: Trigger = name.parse()?;
            let report = match unit.ask(RunHook { trigger }).await {
                Ok(report) => report,
                Err(SendError::HandlerError(e)) => return Err(e.into()),
                Err(_) => eyre::bail!("unit actor is not available"),
            };
            Ok(vec![serde_json::to_string_pretty(&report)?])
        }
        Commands::Flags => {
            let snapshot = unit
                .ask(GetFlags)
                .await
                .map_err(|_| eyre::eyre!("unit actor is not available"))?;
            Ok(snapshot.flags)
        }
        Commands::Status => {
            let report = unit
                .ask(GetStatus)
                .await
                .map_err(|_| eyre::eyre!("unit actor is not available"))?;
            Ok(vec![
                report
                    .status
                    .map_or_else(|| "unknown".to_string(), |status| status.to_string()),
            ])
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_tracing(&config.daemon);

    // Reject unknown hooks before touching the host
    if let Commands::Hook { name } = &cli.command {
        name.parse::<Trigger>()?;
    }

    let actions = Arc::new(factory::create_actions(config.layout.clone()).await?);
    let unit = spawn_unit(&config, actions).await?;

    let outcome = dispatch(&unit, cli.command).await;
    unit.stop_gracefully().await.ok();
    unit.wait_for_shutdown().await;

    for line in outcome? {
        println!("{line}");
    }
    Ok(())
}
