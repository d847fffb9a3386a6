//! Distribution archive packaging
//!
//! The master zips the whole task tree into one archive that workers
//! download and unpack over their local copy.

use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use taskrelay_config::PathsConfig;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{RegistryError, Result};
use crate::stamp::ChangeStamp;

/// Format of the archive change stamp (archive mtime, local time)
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const EXTRACTED_MODE: u32 = 0o755;

/// Builds and restores the task tree archive and keeps its stamp current
#[derive(Debug, Clone)]
pub struct Packager {
    source_dir: PathBuf,
    archive_path: PathBuf,
    stamp: ChangeStamp,
}

impl Packager {
    pub fn new(source_dir: impl Into<PathBuf>, archive_path: impl Into<PathBuf>, stamp: ChangeStamp) -> Self {
        Self {
            source_dir: source_dir.into(),
            archive_path: archive_path.into(),
            stamp,
        }
    }

    pub fn from_config(paths: &PathsConfig, stamp: ChangeStamp) -> Self {
        Self::new(&paths.tasks_dir, &paths.archive_path, stamp)
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn stamp(&self) -> &ChangeStamp {
        &self.stamp
    }

    /// Build the archive if it does not exist yet, then publish its stamp.
    ///
    /// A missing task tree is created empty first.
    pub fn ensure_archive(&self) -> Result<String> {
        if !self.source_dir.exists() {
            info!("Creating missing task tree {:?}", self.source_dir);
            fs::create_dir_all(&self.source_dir)?;
        }

        if !self.archive_path.exists() {
            let count = build_archive(&self.source_dir, &self.archive_path)?;
            info!("Built archive {:?} with {} files", self.archive_path, count);
        }

        self.refresh_stamp()
    }

    /// Rebuild the archive unconditionally and publish its stamp
    pub fn rebuild(&self) -> Result<String> {
        let count = build_archive(&self.source_dir, &self.archive_path)?;
        debug!("Rebuilt archive {:?} with {} files", self.archive_path, count);
        self.refresh_stamp()
    }

    /// Re-read the archive mtime and publish it
    pub fn refresh_stamp(&self) -> Result<String> {
        let stamp = archive_stamp(&self.archive_path)?;
        if self.stamp.publish(stamp.clone()) {
            info!("Archive stamp is now {}", stamp);
        }
        Ok(stamp)
    }

    /// Replace the local task tree with the archive contents
    pub fn restore(&self) -> Result<usize> {
        restore_archive(&self.archive_path, &self.source_dir)
    }
}

/// Zip every regular file under `src_dir` into `dst_path`.
///
/// Directories get no entries of their own. Entry names are relative to
/// `src_dir` with `/` separators. The archive is written next to `dst_path`
/// and moved into place only once complete, so a failed build leaves the
/// previous archive untouched. Returns the number of files written.
pub fn build_archive(src_dir: &Path, dst_path: &Path) -> Result<usize> {
    if let Some(parent) = dst_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let partial = partial_path(dst_path);
    let mut writer = ZipWriter::new(File::create(&partial)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(EXTRACTED_MODE);

    let added = add_tree(&mut writer, src_dir, options);
    let finished = writer.finish();

    let outcome = added.and_then(|count| {
        finished?;
        Ok(count)
    });

    match outcome {
        Ok(count) => {
            fs::rename(&partial, dst_path)?;
            Ok(count)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&partial) {
                warn!("Failed to remove partial archive {:?}: {}", partial, rm);
            }
            Err(e)
        }
    }
}

fn add_tree(writer: &mut ZipWriter<File>, src_dir: &Path, options: SimpleFileOptions) -> Result<usize> {
    let mut count = 0;

    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(src_dir) {
            Ok(relative) => relative,
            Err(_) => continue,
        };

        writer.start_file(entry_name(relative), options)?;
        let mut file = File::open(entry.path())?;
        io::copy(&mut file, writer)?;
        count += 1;
    }

    Ok(count)
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn partial_path(dst_path: &Path) -> PathBuf {
    let mut name = OsString::from(dst_path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

/// Replace `dst_dir` with the contents of the archive at `archive_path`.
///
/// An archive that cannot be opened is deleted so the next download starts
/// clean. Entries with unsafe names are skipped. Extracted files get mode
/// 0755. Returns the number of files extracted.
pub fn restore_archive(archive_path: &Path, dst_dir: &Path) -> Result<usize> {
    let opened = File::open(archive_path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            RegistryError::Io(e)
        } else {
            RegistryError::CorruptArchive {
                path: archive_path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    });
    let opened = opened.and_then(|file| {
        ZipArchive::new(file).map_err(|e| RegistryError::CorruptArchive {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })
    });

    let mut archive = match opened {
        Ok(archive) => archive,
        Err(e @ RegistryError::CorruptArchive { .. }) => {
            error!("{}", e);
            if let Err(rm) = fs::remove_file(archive_path) {
                warn!("Failed to delete corrupt archive {:?}: {}", archive_path, rm);
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if dst_dir.exists() {
        fs::remove_dir_all(dst_dir)?;
    }
    fs::create_dir_all(dst_dir)?;

    debug!("Extracting {} entries from {:?}", archive.len(), archive_path);
    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                warn!("Skipping archive entry with unsafe name: {}", entry.name());
                continue;
            }
        };

        let output_path = dst_dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output_file = File::create(&output_path)?;
        io::copy(&mut entry, &mut output_file)?;
        set_executable(&output_path)?;
        count += 1;
    }

    info!("Restored {} files from {:?} into {:?}", count, archive_path, dst_dir);
    Ok(count)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(EXTRACTED_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Modification time of the archive formatted with [`STAMP_FORMAT`]
pub fn archive_stamp(archive_path: &Path) -> Result<String> {
    let modified = fs::metadata(archive_path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).format(STAMP_FORMAT).to_string())
}
