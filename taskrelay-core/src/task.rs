//! Task definition model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic key of a task, the MD5 hex digest of its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    /// Compute the key for a task name
    pub fn for_name(name: &str) -> Self {
        TaskKey(format!("{:x}", md5::compute(name.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TaskKey> for String {
    fn from(key: TaskKey) -> Self {
        key.0
    }
}

/// Static task definition as stored in `tasks/<name>/spec.toml`.
///
/// `key`, `name` and `assets` are derived from the filesystem when the
/// definition is parsed; whatever the file contains for them is discarded.
/// Older trees wrote capitalized keys (`Cmd`, `OnErrorStop`), accepted as
/// aliases, and older agents sent `null` for empty lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskDefinition {
    /// Externally assigned identifier, the dedup key on the master
    #[serde(alias = "Id")]
    pub id: String,

    #[serde(alias = "Key")]
    pub key: TaskKey,

    /// Name of the directory holding the definition
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(alias = "Description")]
    pub description: String,

    /// Command line handed to the execution engine
    #[serde(alias = "Cmd")]
    pub cmd: String,

    /// Cron expression with seconds: `sec min hour day month weekday`
    #[serde(alias = "Schedule")]
    pub schedule: String,

    /// Hosts allowed to run the task
    #[serde(alias = "Machine", deserialize_with = "null_as_empty::deserialize")]
    pub machine: Vec<String>,

    /// Successor tasks, in order
    #[serde(alias = "Chain", deserialize_with = "null_as_empty::deserialize")]
    pub chain: Vec<String>,

    /// Pattern that marks output as a failure
    #[serde(alias = "Error")]
    pub error: String,

    #[serde(alias = "OnErrorStop")]
    pub on_error_stop: String,

    /// Sibling files of the spec file (scripts, SQL, ...)
    #[serde(alias = "Assets", deserialize_with = "null_as_empty::deserialize")]
    pub assets: Vec<String>,

    /// Successor route followed by the run that produced a record
    #[serde(alias = "Route", deserialize_with = "null_as_empty::deserialize")]
    pub route: Vec<String>,

    #[serde(alias = "Group")]
    pub group: String,

    #[serde(alias = "Tags", deserialize_with = "null_as_empty::deserialize")]
    pub tags: Vec<String>,
}

/// Decode a list that may be written as `null`
mod null_as_empty {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
    }
}

impl TaskDefinition {
    /// Create a definition for the named task with its key already derived
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: TaskKey::for_name(&name),
            name,
            ..Default::default()
        }
    }

    /// Builder pattern for the command
    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = cmd.into();
        self
    }

    /// Builder pattern for the schedule
    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = schedule.into();
        self
    }

    /// Builder pattern for successor tasks
    pub fn with_chain(mut self, chain: Vec<String>) -> Self {
        self.chain = chain;
        self
    }

    /// Re-derive name and key from the directory the definition lives in
    pub fn bind_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.key = TaskKey::for_name(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_md5_of_name() {
        let key = TaskKey::for_name("backup-job");
        assert_eq!(key.as_str(), format!("{:x}", md5::compute(b"backup-job")));
        assert_eq!(key.as_str().len(), 32);
        assert_eq!(key, TaskKey::for_name("backup-job"));
        assert_ne!(key, TaskKey::for_name("backup-job2"));
    }

    #[test]
    fn test_bind_name_overrides_stored_values() {
        let mut def = TaskDefinition {
            name: "stale".to_string(),
            key: TaskKey("bogus".to_string()),
            ..Default::default()
        };
        def.bind_name("nightly");

        assert_eq!(def.name, "nightly");
        assert_eq!(def.key, TaskKey::for_name("nightly"));
    }

    #[test]
    fn test_definition_decodes_partial_toml() {
        let def: TaskDefinition = toml::from_str(
            r#"
            cmd = "backup.sh"
            schedule = "0 0 3 * * *"
            chain = ["verify", "notify"]
            onErrorStop = "true"
            "#,
        )
        .unwrap();

        assert_eq!(def.cmd, "backup.sh");
        assert_eq!(def.chain, vec!["verify", "notify"]);
        assert_eq!(def.on_error_stop, "true");
        assert!(def.name.is_empty());
        assert!(def.assets.is_empty());
    }

    #[test]
    fn test_definition_decodes_capitalized_toml_keys() {
        let def: TaskDefinition = toml::from_str(
            r#"
            Id = ""
            Name = "job"
            Cmd = "backup.sh"
            Schedule = "0 0 3 * * *"
            Machine = ["db-1"]
            Chain = []
            OnErrorStop = "true"
            Group = "nightly"
            ExitCode = 0
            "#,
        )
        .unwrap();

        assert_eq!(def.name, "job");
        assert_eq!(def.cmd, "backup.sh");
        assert_eq!(def.schedule, "0 0 3 * * *");
        assert_eq!(def.machine, vec!["db-1"]);
        assert_eq!(def.on_error_stop, "true");
        assert_eq!(def.group, "nightly");
    }
}
