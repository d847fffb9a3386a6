//! Configuration loading and environment variable handling

use crate::domains::TaskRelayConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable that promotes a node to master role, kept from the
/// agents this one replaces
pub const LEGACY_MASTER_ENV: &str = "HighBatchIsMaster";

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TASKRELAY".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TaskRelayConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<TaskRelayConfig> {
        let mut config: TaskRelayConfig = if content.trim().is_empty() {
            TaskRelayConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TaskRelayConfig> {
        let mut config = TaskRelayConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TaskRelayConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut TaskRelayConfig) -> ConfigResult<()> {
        self.apply_master_overrides(&mut config.master)?;
        self.apply_worker_overrides(&mut config.worker)?;
        self.apply_delivery_overrides(&mut config.delivery)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_master_overrides(
        &self,
        config: &mut crate::domains::master::MasterConfig,
    ) -> ConfigResult<()> {
        if let Ok(host) = self.get_env_var("MASTER_HOST") {
            config.host = host;
        }

        if let Ok(port) = self.get_env_var("MASTER_PORT") {
            config.port = parse_env("MASTER_PORT", &port)?;
        }

        Ok(())
    }

    fn apply_worker_overrides(
        &self,
        config: &mut crate::domains::worker::WorkerConfig,
    ) -> ConfigResult<()> {
        if let Ok(host) = self.get_env_var("WORKER_HOST") {
            config.host = host;
        }

        if let Ok(port) = self.get_env_var("WORKER_PORT") {
            config.port = parse_env("WORKER_PORT", &port)?;
        }

        // Any non-empty value promotes the node; the variable never demotes one
        let promoted = self
            .get_env_var("IS_MASTER")
            .ok()
            .into_iter()
            .chain(std::env::var(LEGACY_MASTER_ENV).ok())
            .any(|value| !value.is_empty());
        if promoted {
            config.is_master = true;
        }

        Ok(())
    }

    fn apply_delivery_overrides(
        &self,
        config: &mut crate::domains::delivery::DeliveryConfig,
    ) -> ConfigResult<()> {
        if let Ok(interval) = self.get_env_var("RESEND_INTERVAL") {
            let seconds: u64 = parse_env("RESEND_INTERVAL", &interval)?;
            config.resend_interval = Duration::from_secs(seconds);
        }

        if let Ok(timeout) = self.get_env_var("HTTP_TIMEOUT") {
            let seconds: u64 = parse_env("HTTP_TIMEOUT", &timeout)?;
            config.request_timeout = Duration::from_secs(seconds);
            // A tighter request timeout caps the connect timeout too
            config.connect_timeout = config.connect_timeout.min(config.request_timeout);
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))
}
