//! On-disk staging buffer for execution records
//!
//! Every record is written here before it is sent and removed once the
//! master accepted it, so a crash or an unreachable master never loses one.
//! File names are `<timestamp>-<8 hex>`; older agents wrote the bare
//! timestamp, and those files are still picked up.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use taskrelay_config::PathsConfig;
use taskrelay_core::ExecutionRecord;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DeliveryError, Result};

static STAGED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{14,17}(-[0-9a-f]{8})?$").expect("staged name pattern is valid"));

const MIN_STAMP_DIGITS: usize = 14;
const MAX_STAMP_DIGITS: usize = 17;

/// Whether `name` looks like a file written by [`ResultBuffer::stage`]
pub fn is_staged_name(name: &str) -> bool {
    STAGED_NAME.is_match(name)
}

/// Build a fresh staged name from a record's completion timestamp.
///
/// Digits are taken from `completed`; if there are fewer than 14 the current
/// local time is used instead.
pub fn staged_name(completed: &str) -> String {
    let mut stamp: String = completed.chars().filter(|c| c.is_ascii_digit()).collect();
    if stamp.len() < MIN_STAMP_DIGITS {
        stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    }
    stamp.truncate(MAX_STAMP_DIGITS);

    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", stamp, &suffix[..8])
}

fn temp_name(name: &str) -> String {
    format!(".{}.tmp", name)
}

fn staged_name_of_temp(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .filter(|name| is_staged_name(name))
}

#[derive(Debug, Clone)]
pub struct ResultBuffer {
    dir: PathBuf,
}

impl ResultBuffer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.staging_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize and persist a record, returning its staged name
    pub fn stage(&self, record: &ExecutionRecord) -> Result<String> {
        let body = record.to_json()?;
        self.stage_bytes(record.completed(), &body)
    }

    /// Persist an already serialized record.
    ///
    /// The body goes to a hidden temporary file first and is renamed into
    /// place, so the sweep never sees a half-written record.
    pub fn stage_bytes(&self, completed: &str, body: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.dir)?;

        let name = staged_name(completed);
        let temp_path = self.dir.join(temp_name(&name));
        fs::write(&temp_path, body)?;

        if let Err(e) = fs::rename(&temp_path, self.dir.join(&name)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        debug!("Staged record {} in {:?}", name, self.dir);
        Ok(name)
    }

    /// Remove a staged record. Removing one that is already gone succeeds.
    pub fn unstage(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Unstaged record {}", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw bytes of a staged record
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path_of(name)?)?)
    }

    pub fn load(&self, name: &str) -> Result<ExecutionRecord> {
        Ok(ExecutionRecord::from_json(&self.read(name)?)?)
    }

    /// Names of all staged records, oldest first
    pub fn pending(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if is_staged_name(&name) => names.push(name),
                Ok(_) => {}
                Err(raw) => warn!("Ignoring non UTF-8 file in staging dir: {:?}", raw),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete temporary files left behind by a stage that never finished.
    ///
    /// Only files older than `max_age` go, so a stage in progress keeps its
    /// temporary file. Returns how many were removed.
    pub fn purge_stale_temp(&self, max_age: Duration) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let is_temp = entry
                .file_name()
                .to_str()
                .and_then(staged_name_of_temp)
                .is_some();
            if !is_temp || !entry.file_type()?.is_file() {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale temporary file {:?}", entry.path());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        if !is_staged_name(name) {
            return Err(DeliveryError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }
}
