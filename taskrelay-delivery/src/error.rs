use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    Record(#[from] taskrelay_core::CoreError),

    #[error("Not a staged record name: {0}")]
    InvalidName(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Request to {url} failed: {error}")]
    Network { url: String, error: String },

    #[error("Master at {url} answered {status}: {response}")]
    Rejected { url: String, status: u16, response: String },
}

impl DeliveryError {
    /// Failures of the request itself, as opposed to local staging problems
    pub fn is_transport(&self) -> bool {
        matches!(self, DeliveryError::Network { .. } | DeliveryError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
