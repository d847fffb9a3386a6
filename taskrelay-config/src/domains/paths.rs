//! Filesystem layout configuration

use crate::error::ConfigResult;
use crate::validation::{validate_enum_choice, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Encoding labels understood when normalizing asset text
pub const SUPPORTED_ENCODINGS: &[&str] = &[
    "utf-8",
    "utf8",
    "shift_jis",
    "sjis",
    "euc-jp",
    "iso-2022-jp",
    "windows-1252",
    "gbk",
    "euc-kr",
];

/// Locations of the task tree, the distribution archive and the staging buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the task definitions tree
    pub tasks_dir: PathBuf,

    /// File name of the spec inside each task directory
    pub spec_file: String,

    /// Zip snapshot of the task tree handed to workers
    pub archive_path: PathBuf,

    /// Directory buffering execution records until delivered
    pub staging_dir: PathBuf,

    /// Encodings tried in order when reading asset text
    pub asset_encodings: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("tasks"),
            spec_file: "spec.toml".to_string(),
            archive_path: ["public", "static", "file", "tasks.zip"].iter().collect(),
            staging_dir: PathBuf::from("temp"),
            asset_encodings: vec!["utf-8".to_string(), "shift_jis".to_string()],
        }
    }
}

impl PathsConfig {
    /// Extension (with leading dot) identifying spec files
    pub fn spec_suffix(&self) -> String {
        match self.spec_file.rsplit_once('.') {
            Some((_, ext)) => format!(".{}", ext),
            None => self.spec_file.clone(),
        }
    }
}

impl Validatable for PathsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.spec_file, "spec_file", self.domain_name())?;
        if self.spec_file.contains(['/', '\\']) {
            return Err(self.validation_error("spec_file must be a bare file name"));
        }

        if self.tasks_dir.as_os_str().is_empty() {
            return Err(self.validation_error("tasks_dir cannot be empty"));
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(self.validation_error("staging_dir cannot be empty"));
        }
        if self.archive_path.starts_with(&self.tasks_dir) {
            return Err(self.validation_error("archive_path cannot live inside tasks_dir"));
        }

        if self.asset_encodings.is_empty() {
            return Err(self.validation_error("at least one asset encoding is required"));
        }
        for label in &self.asset_encodings {
            validate_enum_choice(label, SUPPORTED_ENCODINGS, "asset_encodings", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "paths"
    }
}
