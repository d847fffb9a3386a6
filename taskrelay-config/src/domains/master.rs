//! Master endpoint configuration

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};

/// Where execution records are delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Hostname of the master node
    pub host: String,

    /// Port of the master logger endpoint
    pub port: u16,

    /// Path receiving POSTed records
    pub logger_path: String,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8081,
            logger_path: "/logger".to_string(),
        }
    }
}

impl MasterConfig {
    /// Full URL of the logger endpoint
    pub fn logger_url(&self) -> String {
        let path = self.logger_path.trim_start_matches('/');
        format!("http://{}:{}/{}", self.host, self.port, path)
    }
}

impl Validatable for MasterConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.host, "host", self.domain_name())?;
        validate_port_range(self.port, "port", self.domain_name())?;
        validate_url(&self.logger_url(), "logger_url", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "master"
    }
}
