//! Execution record model
//!
//! Records are staged on disk and POSTed to the master in the same JSON
//! shape. Every field defaults on decode so files written by older agents
//! keep loading.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::task::TaskDefinition;

/// Outcome fields filled in by the execution engine after a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Host that ran the task
    pub hostname: String,

    pub started: String,

    /// Completion timestamp, also used to name the staged file
    pub completed: String,

    pub duration: String,

    pub exit_code: i32,

    /// Captured output of the command
    pub output: String,

    pub duration_int: String,

    pub resolved: String,
}

/// One run of a task: the definition it ran plus what happened
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(flatten)]
    pub task: TaskDefinition,

    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

impl ExecutionRecord {
    /// Start a record for a run of `task`, identified by `id`
    pub fn new(id: impl Into<String>, task: TaskDefinition) -> Self {
        let mut task = task;
        task.id = id.into();
        Self {
            task,
            outcome: ExecutionOutcome::default(),
        }
    }

    pub fn with_outcome(mut self, outcome: ExecutionOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Identifier the master deduplicates on
    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn completed(&self) -> &str {
        &self.outcome.completed
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Reject records the master could not deduplicate
    pub fn validate(&self) -> Result<()> {
        if self.task.id.is_empty() {
            return Err(CoreError::InvalidRecord(format!(
                "record for task '{}' has no id",
                self.task.name
            )));
        }
        Ok(())
    }
}
