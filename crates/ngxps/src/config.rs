//! Configuration loading and types

use std::path::{Path, PathBuf};

use ngxps_core::{CoreError, StaticEnvironment};
use ngxps_nginx::Layout;
use serde::{Deserialize, Serialize};

/// Top-level configuration of the ngxps binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub unit: UnitConfig,
    /// Where nginx and its supporting files live
    #[serde(default)]
    pub layout: Layout,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Directory holding the persisted unit state
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            state_dir: default_state_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/ngxps")
}

/// Where the unit inputs come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    /// TOML document with `[config]`, `[relations]` and `[resources]`
    #[serde(default = "default_environment")]
    pub environment: PathBuf,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
        }
    }
}

fn default_environment() -> PathBuf {
    PathBuf::from("/etc/ngxps/unit.toml")
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("NGXPS_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let mut paths = vec![
            PathBuf::from("ngxps.toml"),
            PathBuf::from("/etc/ngxps/ngxps.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("ngxps/ngxps.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Path of the persisted unit state
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.daemon.state_dir.join("unit.json")
    }

    /// Read the unit inputs; a missing document means no inputs at all
    ///
    /// # Errors
    /// Returns error if the document exists but cannot be parsed
    pub fn environment(&self) -> Result<StaticEnvironment, CoreError> {
        let path = &self.unit.environment;
        if !path.exists() {
            tracing::warn!(path = %path.display(), "no unit inputs found, using defaults");
            return Ok(StaticEnvironment::default());
        }
        StaticEnvironment::load(path)
    }
}
