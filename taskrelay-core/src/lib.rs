//! Core domain model for taskrelay
//!
//! A task is described twice: as a static [`TaskDefinition`] read from the
//! task tree, and as an [`ExecutionRecord`] produced once per run. The record
//! composes the definition with an [`ExecutionOutcome`] so that its JSON shape
//! stays the flat field set older agents staged and masters expect.

pub mod error;
pub mod execution;
pub mod task;

// Re-export commonly used types at the crate root
pub use error::{CoreError, Result};
pub use execution::{ExecutionOutcome, ExecutionRecord};
pub use task::{TaskDefinition, TaskKey};
