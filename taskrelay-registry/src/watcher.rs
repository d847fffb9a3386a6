use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use taskrelay_config::WatcherConfig;

use crate::error::{RegistryError, Result};
use crate::packager::Packager;

/// Watches the task tree and rebuilds the archive after changes.
///
/// Every directory present when [`TreeWatcher::run`] starts is watched on its
/// own; directories created later are not picked up until restart.
pub struct TreeWatcher {
    packager: Packager,
    root: PathBuf,
    debounce: Duration,
}

impl TreeWatcher {
    pub fn new(packager: Packager, config: &WatcherConfig) -> Self {
        let root = packager.source_dir().to_path_buf();
        Self {
            packager,
            root,
            debounce: Duration::from_millis(config.debounce_ms.max(1)),
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Fails only if the watcher cannot be created. Everything after that,
    /// from notify errors to failed rebuilds, is logged and the loop carries on.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| RegistryError::WatcherError(format!("Failed to create watcher: {}", e)))?;

        let watched = watch_directories(&mut watcher, &self.root);
        info!("Watching {} directories under {:?}", watched, self.root);

        let mut debounce_interval = interval(self.debounce);
        debounce_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut dirty = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Tree watcher shutting down");
                    break;
                }

                Some(res) = event_rx.recv() => match res {
                    Ok(event) if is_relevant(&event) => {
                        debug!("Task tree changed: {:?} {:?}", event.kind, event.paths);
                        dirty = true;
                    }
                    Ok(_) => {}
                    Err(e) => error!("Watch error: {}", e),
                },

                _ = debounce_interval.tick() => {
                    if dirty {
                        dirty = false;
                        self.rebuild().await;
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    async fn rebuild(&self) {
        let packager = self.packager.clone();
        match tokio::task::spawn_blocking(move || packager.rebuild()).await {
            Ok(Ok(stamp)) => info!("Archive rebuilt, stamp {}", stamp),
            Ok(Err(e)) => error!("Failed to rebuild archive: {}", e),
            Err(e) => error!("Archive rebuild task failed: {}", e),
        }
    }
}

/// Register a non-recursive watch on `root` and each directory below it
fn watch_directories(watcher: &mut RecommendedWatcher, root: &Path) -> usize {
    let mut watched = 0;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("Failed to walk {:?} for watching: {}", root, e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        match watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
            Ok(()) => watched += 1,
            Err(e) => warn!("Failed to watch {:?}: {}", entry.path(), e),
        }
    }

    watched
}

/// Reads do not change the tree; rebuilding on them would feed on itself
fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_access_events_are_ignored() {
        assert!(!is_relevant(&Event::new(EventKind::Access(AccessKind::Any))));
        assert!(is_relevant(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(is_relevant(&Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(is_relevant(&Event::new(EventKind::Remove(notify::event::RemoveKind::Any))));
    }
}
