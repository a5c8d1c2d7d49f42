//! Inputs the unit receives from its surroundings
//!
//! Configuration values, relation data from peers and resource files arrive
//! through this trait. The engine reads them once at the start of a pass.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{SiteContext, UnitConfig};
use crate::error::CoreError;

pub trait UnitEnvironment: Send + Sync {
    /// Current unit configuration
    fn config(&self) -> Result<UnitConfig, CoreError>;

    /// Site contexts of the web-engine relation, `None` when not related
    fn site_contexts(&self) -> Option<Vec<SiteContext>>;

    /// Cache backend endpoints (`host:port`), `None` when not related
    fn cache_peers(&self) -> Option<Vec<String>>;

    /// Local path of a named resource, if it was supplied
    fn resource(&self, name: &str) -> Option<PathBuf>;
}

/// Relation data as written in the environment document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relations {
    #[serde(default, rename = "web-engine")]
    pub web_engine: Option<Vec<SiteContext>>,
    #[serde(default)]
    pub cache: Option<Vec<String>>,
}

/// Environment read from a TOML document
///
/// ```toml
/// [config]
/// tmpfs_size = 512
///
/// [[relations.web-engine]]
/// service_name = "site1"
/// root = "/var/www"
///
/// [resources]
/// ngxps_deb = "/var/lib/ngxps/resources/nginx.deb"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticEnvironment {
    #[serde(default)]
    pub config: UnitConfig,
    #[serde(default)]
    pub relations: Relations,
    #[serde(default)]
    pub resources: BTreeMap<String, PathBuf>,
}

impl StaticEnvironment {
    /// Load an environment document
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!("failed to read '{}': {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            CoreError::ConfigError(format!("failed to parse '{}': {e}", path.display()))
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: UnitConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sites(mut self, sites: Vec<SiteContext>) -> Self {
        self.relations.web_engine = Some(sites);
        self
    }

    #[must_use]
    pub fn with_cache_peers(mut self, peers: Vec<String>) -> Self {
        self.relations.cache = Some(peers);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.resources.insert(name.into(), path.into());
        self
    }
}

impl UnitEnvironment for StaticEnvironment {
    fn config(&self) -> Result<UnitConfig, CoreError> {
        Ok(self.config.clone())
    }

    fn site_contexts(&self) -> Option<Vec<SiteContext>> {
        self.relations.web_engine.clone()
    }

    fn cache_peers(&self) -> Option<Vec<String>> {
        self.relations.cache.clone()
    }

    fn resource(&self, name: &str) -> Option<PathBuf> {
        self.resources.get(name).cloned()
    }
}
