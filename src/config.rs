use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// What to do when a document that already has a monitor is reported opened
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReopenPolicy {
    /// Retire the existing monitor (tearing down its annotation
    /// subscriptions) before probing for a replacement. Default.
    RetireFirst,
    /// Last write wins: the replacement simply displaces the map entry.
    /// Matches hosts that rely on the historical overwrite behavior.
    Overwrite,
}

/// Tunables for the manager and the deferred check scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub reopen_policy: ReopenPolicy,
    /// Debounce delay applied by `DeferredScheduler` between an annotation
    /// change and the monitor's check pass, in milliseconds.
    pub check_delay_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            reopen_policy: ReopenPolicy::RetireFirst,
            check_delay_ms: 100,
        }
    }
}

impl ManagerConfig {
    pub fn check_delay(&self) -> Duration {
        Duration::from_millis(self.check_delay_ms)
    }

    /// Loads a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
