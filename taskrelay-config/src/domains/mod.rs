//! Domain-specific configuration modules

pub mod delivery;
pub mod logging;
pub mod master;
pub mod paths;
pub mod utils;
pub mod watcher;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main agent configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaskRelayConfig {
    /// Master endpoint receiving execution records
    pub master: master::MasterConfig,

    /// Identity and role of this node
    pub worker: worker::WorkerConfig,

    /// Task tree, archive and staging locations
    pub paths: paths::PathsConfig,

    /// Send path and resend sweep timing
    pub delivery: delivery::DeliveryConfig,

    /// Task tree watcher
    pub watcher: watcher::WatcherConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl TaskRelayConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.master.validate()?;
        self.worker.validate()?;
        self.paths.validate()?;
        self.delivery.validate()?;
        self.watcher.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TaskRelayConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
