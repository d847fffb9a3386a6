//! Domain-driven configuration for taskrelay
//!
//! Configuration is split by functional domain (master endpoint, worker
//! identity, filesystem layout, delivery, watcher, logging). Each domain has
//! defaults, validation, and environment variable overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    delivery::DeliveryConfig, logging::LoggingConfig, master::MasterConfig, paths::PathsConfig,
    watcher::WatcherConfig, worker::WorkerConfig, TaskRelayConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
