//! Worker identity configuration

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};

/// Identity and role of this node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub host: String,

    pub port: u16,

    /// Master nodes own the authoritative task tree and keep the archive fresh
    pub is_master: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8082,
            is_master: false,
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.host, "host", self.domain_name())?;
        validate_port_range(self.port, "port", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}
