//! Unit configuration and peer-provided site contexts

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Service name of the site installed when no peer provides one
pub const DEFAULT_SITE: &str = "default";
/// Document root of the default site
pub const DEFAULT_SITE_ROOT: &str = "/usr/local/nginx/html";

/// Configuration key holding the cache tmpfs size
pub const TMPFS_SIZE: &str = "tmpfs_size";
/// Configuration key holding the DH parameter size
pub const DHE_SIZE: &str = "dhe_size";

/// Operator-facing configuration of the unit
///
/// Besides the two keys the engine acts on, every other key is passed
/// verbatim to the configuration templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    /// Size of the cache tmpfs in MB
    #[serde(default = "default_tmpfs_size")]
    pub tmpfs_size: u64,
    /// Diffie-Hellman parameter size in bits
    #[serde(default = "default_dhe_size")]
    pub dhe_size: u32,
    /// Template variables (TLS settings, pagespeed toggles, naxsi policy)
    #[serde(flatten)]
    pub vars: BTreeMap<String, Value>,
}

fn default_tmpfs_size() -> u64 {
    512
}

fn default_dhe_size() -> u32 {
    2048
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            tmpfs_size: default_tmpfs_size(),
            dhe_size: default_dhe_size(),
            vars: BTreeMap::new(),
        }
    }
}

impl UnitConfig {
    /// Set a template variable
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Every key with its value, as seen by templates
    ///
    /// # Errors
    /// Returns an error if a value cannot be represented as JSON
    pub fn entries(&self) -> Result<Map<String, Value>, CoreError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(CoreError::ConfigError(format!(
                "configuration is not a mapping: {other}"
            ))),
        }
    }
}

/// Per-site context provided by a web-engine peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteContext {
    /// Name of the site directory under sites-enabled
    pub service_name: String,
    /// Document root
    pub root: String,
    /// Anything else the peer sent (ports, server names, upstreams)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SiteContext {
    pub fn new(service_name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            root: root.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Site served when no peer relation exists
    #[must_use]
    pub fn default_site() -> Self {
        Self::new(DEFAULT_SITE, DEFAULT_SITE_ROOT)
    }

    /// Whether `service_name` is usable as a single directory name
    #[must_use]
    pub fn has_valid_name(&self) -> bool {
        let name = self.service_name.as_str();
        !name.is_empty() && name != "." && name != ".." && !name.contains('/')
    }
}
