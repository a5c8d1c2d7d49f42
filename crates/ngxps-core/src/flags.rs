//! Flag names and the flag store
//!
//! A flag is a persisted boolean fact: present means true, absent means false.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const INSTALLED: &str = "ngxps.installed";
pub const CONFIGURE: &str = "ngxps.configure";
pub const CONFIGURED: &str = "ngxps.configured";
pub const READY: &str = "ngxps.ready";

pub const RELOAD: &str = "ngxps.reload";
pub const UPGRADE: &str = "ngxps.upgrade";
pub const RESTART: &str = "ngxps.restart";
/// Outstanding work against the running service
pub const PENDING: [&str; 3] = [RESTART, UPGRADE, RELOAD];

pub const DHE_READY: &str = "dhe.ready";
pub const TMPFS_READY: &str = "tmpfs.ready";
pub const CACHE_READY: &str = "cache.ready";

pub const WEB_ENGINE_AVAILABLE: &str = "web-engine.available";
pub const CACHE_AVAILABLE: &str = "cache.available";

pub const CONFIG_CHANGED: &str = "config.changed";

/// Flag raised for a single changed configuration key
#[must_use]
pub fn config_changed(key: &str) -> String {
    format!("{CONFIG_CHANGED}.{key}")
}

/// Persisted set of flags
///
/// Mutations are idempotent. Every effective mutation bumps an in-memory
/// generation counter so the engine can tell which flags moved since a
/// handler last ran; the counters are not persisted.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagStore {
    flags: BTreeSet<String>,
    #[serde(skip)]
    touched: HashMap<String, u64>,
    #[serde(skip)]
    generation: u64,
}

impl FlagStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag; a no-op when already set
    pub fn set(&mut self, name: impl AsRef<str>) {
        let name = name.as_ref();
        if self.flags.insert(name.to_string()) {
            debug!(flag = name, "flag set");
            self.touch(name);
        }
    }

    /// Clear a flag; a no-op when absent
    pub fn clear(&mut self, name: impl AsRef<str>) {
        let name = name.as_ref();
        if self.flags.remove(name) {
            debug!(flag = name, "flag cleared");
            self.touch(name);
        }
    }

    /// Set or clear depending on `value`
    pub fn toggle(&mut self, name: impl AsRef<str>, value: bool) {
        if value {
            self.set(name);
        } else {
            self.clear(name);
        }
    }

    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    /// Clear every flag equal to `prefix` or nested under `prefix.`
    pub fn clear_namespace(&mut self, prefix: &str) {
        let nested = format!("{prefix}.");
        let doomed: Vec<String> = self
            .flags
            .iter()
            .filter(|f| f.as_str() == prefix || f.starts_with(&nested))
            .cloned()
            .collect();
        for flag in doomed {
            self.clear(flag);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.flags.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Current mutation generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Latest generation at which any of `names` changed, 0 if none did
    #[must_use]
    pub fn last_touched<'a, I>(&self, names: I) -> u64
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(|name| self.touched.get(name).copied())
            .max()
            .unwrap_or(0)
    }

    fn touch(&mut self, name: &str) {
        self.generation += 1;
        self.touched.insert(name.to_string(), self.generation);
    }
}
