//! Change detection against persisted baselines
//!
//! `changed` is compute-and-commit: it compares and, on a difference, records
//! the new value. Calling it twice with the same value in one pass reports
//! "unchanged" the second time. Handlers that must act before recording use
//! `peek` followed by `commit` once the action succeeded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Well-known baseline keys
pub mod keys {
    /// Site contexts received over the web-engine relation
    pub const WEB_ENGINE_CONTEXTS: &str = "web-engine.contexts";
    /// Cache backend endpoints received over the cache relation
    pub const CACHE_PEERS: &str = "cache.peers";
    /// Fingerprints of every file under sites-enabled
    pub const SITES_FILES: &str = "ngxps.sites_files";
    /// Identity of the installed artifacts
    pub const ARTIFACTS: &str = "ngxps.artifacts";
    /// Whole unit configuration
    pub const CONFIG: &str = "config";

    /// Baseline of one configuration key
    #[must_use]
    pub fn config_key(key: &str) -> String {
        format!("{CONFIG}.{key}")
    }
}

/// Named baselines of previously seen values
///
/// Values are compared as JSON, so mappings compare independently of
/// insertion order.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeDetector {
    baselines: BTreeMap<String, Value>,
}

impl ChangeDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `value` with the baseline for `key` and record it when different
    ///
    /// The first call for a key always reports a change.
    ///
    /// # Errors
    /// Returns an error if `value` cannot be serialised
    pub fn changed<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<bool, CoreError> {
        let value = serde_json::to_value(value)?;
        if self.baselines.get(key) == Some(&value) {
            return Ok(false);
        }
        self.baselines.insert(key.to_string(), value);
        Ok(true)
    }

    /// Compare without recording
    ///
    /// # Errors
    /// Returns an error if `value` cannot be serialised
    pub fn peek<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool, CoreError> {
        let value = serde_json::to_value(value)?;
        Ok(self.baselines.get(key) != Some(&value))
    }

    /// Record `value` as the baseline for `key` without comparing
    ///
    /// # Errors
    /// Returns an error if `value` cannot be serialised
    pub fn commit<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), CoreError> {
        let value = serde_json::to_value(value)?;
        self.baselines.insert(key.to_string(), value);
        Ok(())
    }

    /// Drop the baseline for `key`, so the next comparison reports a change
    pub fn forget(&mut self, key: &str) {
        self.baselines.remove(key);
    }

    #[must_use]
    pub fn baseline(&self, key: &str) -> Option<&Value> {
        self.baselines.get(key)
    }
}
