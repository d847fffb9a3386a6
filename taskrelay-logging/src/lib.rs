//! Logging setup for taskrelay
//!
//! Library crates only emit `tracing` events; binaries call one of the
//! initializers here once at startup.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing};
pub use taskrelay_config::LoggingConfig;
