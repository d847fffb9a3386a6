//! Result delivery configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of the send path and the background resend sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Pause between two resend sweeps
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub resend_interval: Duration,

    /// Pause between two records within a sweep
    #[serde(with = "crate::domains::utils::serde_duration_ms", rename = "item_delay_ms")]
    pub item_delay: Duration,

    /// TCP connect timeout towards the master
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub connect_timeout: Duration,

    /// Whole request timeout towards the master
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub request_timeout: Duration,

    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_secs(15 * 60),
            item_delay: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("taskrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Validatable for DeliveryConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.resend_interval.as_secs(), "resend_interval", self.domain_name())?;
        validate_positive(self.connect_timeout.as_secs(), "connect_timeout", self.domain_name())?;
        validate_positive(self.request_timeout.as_secs(), "request_timeout", self.domain_name())?;
        validate_required_string(&self.user_agent, "user_agent", self.domain_name())?;

        if self.connect_timeout > self.request_timeout {
            return Err(self.validation_error("connect_timeout cannot exceed request_timeout"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "delivery"
    }
}
