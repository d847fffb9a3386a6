//! Task tree watcher configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Rebuild the archive when the task tree changes
    pub enabled: bool,

    /// Quiet period collapsing bursts of events into one rebuild
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
        }
    }
}

impl Validatable for WatcherConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.debounce_ms, "debounce_ms", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "watcher"
    }
}
