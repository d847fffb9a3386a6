//! Transport towards the master's logger endpoint

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use taskrelay_config::{DeliveryConfig, MasterConfig};
use tracing::debug;

use crate::error::{DeliveryError, Result};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Sends one serialized execution record
#[async_trait]
pub trait RecordSender: Send + Sync {
    /// Deliver `body`; only an acknowledged delivery returns `Ok`
    async fn send(&self, body: &[u8]) -> Result<()>;

    /// Where records go, for logging
    fn endpoint(&self) -> &str;
}

/// POSTs records to the master over HTTP.
///
/// Anything but `200 OK` counts as a failed delivery.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    url: String,
}

impl HttpSender {
    pub fn new(url: impl Into<String>, config: &DeliveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(master: &MasterConfig, delivery: &DeliveryConfig) -> Result<Self> {
        Self::new(master.logger_url(), delivery)
    }
}

#[async_trait]
impl RecordSender for HttpSender {
    async fn send(&self, body: &[u8]) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| DeliveryError::Network {
                url: self.url.clone(),
                error: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let response = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                url: self.url.clone(),
                status: status.as_u16(),
                response,
            });
        }

        debug!("Delivered {} bytes to {}", body.len(), self.url);
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
