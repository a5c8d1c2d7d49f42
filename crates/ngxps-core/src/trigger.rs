//! External triggers that start a reconciliation pass

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Hook delivered to the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Install,
    UpgradeCharm,
    ConfigChanged,
    UpdateStatus,
    Stop,
    WebEngineRelationChanged,
    WebEngineRelationDeparted,
    CacheRelationChanged,
    CacheRelationDeparted,
}

impl Trigger {
    pub const ALL: [Trigger; 9] = [
        Trigger::Install,
        Trigger::UpgradeCharm,
        Trigger::ConfigChanged,
        Trigger::UpdateStatus,
        Trigger::Stop,
        Trigger::WebEngineRelationChanged,
        Trigger::WebEngineRelationDeparted,
        Trigger::CacheRelationChanged,
        Trigger::CacheRelationDeparted,
    ];

    /// Hook name as delivered on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Install => "install",
            Trigger::UpgradeCharm => "upgrade-charm",
            Trigger::ConfigChanged => "config-changed",
            Trigger::UpdateStatus => "update-status",
            Trigger::Stop => "stop",
            Trigger::WebEngineRelationChanged => "web-engine-relation-changed",
            Trigger::WebEngineRelationDeparted => "web-engine-relation-departed",
            Trigger::CacheRelationChanged => "cache-relation-changed",
            Trigger::CacheRelationDeparted => "cache-relation-departed",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownTrigger(s.to_string()))
    }
}
