use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Corrupt archive {path:?}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Spec parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Spec serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Watcher error: {0}")]
    WatcherError(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
