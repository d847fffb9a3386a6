//! Filesystem task store
//!
//! The task tree is `<root>/<name>/<spec_file>` plus any sibling asset files.
//! A definition's name and key always come from its directory, and its asset
//! list from the files next to it; the spec file never decides them.

use encoding_rs::Encoding;
use std::fs;
use std::path::{Component, Path, PathBuf};
use taskrelay_config::PathsConfig;
use taskrelay_core::TaskDefinition;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::encoding::{decode_first, default_encodings, resolve_encodings};
use crate::error::{RegistryError, Result};

pub const DEFAULT_SPEC_FILE: &str = "spec.toml";

#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
    spec_file: String,
    spec_suffix: String,
    encodings: Vec<&'static Encoding>,
}

impl TaskStore {
    /// Store rooted at `root` using `spec.toml` and the default encodings
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            spec_file: DEFAULT_SPEC_FILE.to_string(),
            spec_suffix: ".toml".to_string(),
            encodings: default_encodings(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self {
            root: paths.tasks_dir.clone(),
            spec_file: paths.spec_file.clone(),
            spec_suffix: paths.spec_suffix(),
            encodings: resolve_encodings(&paths.asset_encodings),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn spec_file(&self) -> &str {
        &self.spec_file
    }

    fn is_spec_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(&self.spec_suffix))
            .unwrap_or(false)
    }

    /// Parse one spec file.
    ///
    /// Name and key are derived from the enclosing directory and assets from
    /// its siblings. A file that cannot be read or decoded is logged and
    /// yields a definition with only those derived fields set.
    pub fn parse_spec(&self, path: &Path) -> TaskDefinition {
        let mut definition = decode_spec(path).unwrap_or_else(|e| {
            error!("Failed to load spec {:?}: {}", path, e);
            TaskDefinition::default()
        });

        let task_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let name = task_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        definition.bind_name(&name);
        definition.assets = self.find_assets(task_dir);
        definition
    }

    /// Every spec file under the root, in walk order (sorted by file name).
    ///
    /// A walk error is logged and ends the walk; definitions found before it
    /// are still returned.
    pub fn discover_specs(&self) -> Vec<TaskDefinition> {
        let mut definitions = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to walk task tree {:?}: {}", self.root, e);
                    break;
                }
            };

            if entry.file_type().is_file() && self.is_spec_file(entry.path()) {
                debug!("Found spec file: {:?}", entry.path());
                definitions.push(self.parse_spec(entry.path()));
            }
        }

        definitions
    }

    /// Names of the non-spec files under `task_dir`, sorted
    pub fn find_assets(&self, task_dir: &Path) -> Vec<String> {
        let mut assets = Vec::new();
        if !task_dir.is_dir() {
            return assets;
        }

        for entry in WalkDir::new(task_dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to list assets in {:?}: {}", task_dir, e);
                    break;
                }
            };

            if entry.file_type().is_file() && !self.is_spec_file(entry.path()) {
                assets.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        assets
    }

    /// Read an asset as text, trying each configured encoding in order.
    ///
    /// Bytes no encoding accepts give an empty string. Only a failed read is
    /// an error.
    pub fn read_assets(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        let text = decode_first(&bytes, &self.encodings);
        if text.is_empty() && !bytes.is_empty() {
            warn!("Asset {:?} is not valid in any configured encoding", path);
        }
        Ok(text)
    }

    /// Persist a definition to `<root>/<name>/<spec_file>`.
    ///
    /// Derived fields (key, assets) are not written.
    pub fn write_spec(&self, spec: &TaskDefinition) -> Result<PathBuf> {
        validate_name(&spec.name)?;

        let task_dir = self.root.join(&spec.name);
        fs::create_dir_all(&task_dir)?;

        let mut stored = spec.clone();
        stored.key = Default::default();
        stored.assets.clear();

        let path = task_dir.join(&self.spec_file);
        fs::write(&path, toml::to_string(&stored)?)?;
        debug!("Wrote spec {:?}", path);

        Ok(path)
    }

    /// Load the definition of a single task by name
    pub fn load_task(&self, name: &str) -> Result<TaskDefinition> {
        validate_name(name)?;

        let path = self.root.join(name).join(&self.spec_file);
        if !path.is_file() {
            return Err(RegistryError::TaskNotFound(name.to_string()));
        }
        Ok(self.parse_spec(&path))
    }

    /// Path of an asset inside a task directory
    pub fn asset_path(&self, name: &str, asset: &str) -> Result<PathBuf> {
        validate_name(name)?;
        validate_name(asset)?;
        Ok(self.root.join(name).join(asset))
    }
}

fn decode_spec(path: &Path) -> Result<TaskDefinition> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Accept only a single normal path component
fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(RegistryError::InvalidName(name.to_string())),
    }
}
