//! Long-running agent process
//!
//! One [`AgentContext`] is built at startup and owns every piece of shared
//! state: the task store, the packager with its change stamp, and the
//! delivery pipeline.

use anyhow::{Context, Result};
use std::time::Duration;
use taskrelay_config::TaskRelayConfig;
use taskrelay_delivery::DeliveryPipeline;
use taskrelay_registry::{ChangeStamp, Packager, TaskStore, TreeWatcher};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AgentContext {
    config: TaskRelayConfig,
    store: TaskStore,
    packager: Packager,
    pipeline: DeliveryPipeline,
}

impl AgentContext {
    pub fn new(config: TaskRelayConfig) -> Result<Self> {
        let stamp = ChangeStamp::new();
        let store = TaskStore::from_config(&config.paths);
        let packager = Packager::from_config(&config.paths, stamp);
        let pipeline = DeliveryPipeline::from_config(&config).context("Failed to set up result delivery")?;

        Ok(Self {
            config,
            store,
            packager,
            pipeline,
        })
    }

    pub fn config(&self) -> &TaskRelayConfig {
        &self.config
    }

    pub fn is_master(&self) -> bool {
        self.config.worker.is_master
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn packager(&self) -> &Packager {
        &self.packager
    }

    pub fn stamp(&self) -> &ChangeStamp {
        self.packager.stamp()
    }

    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }

    /// Start the background loops for this node's role
    pub async fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.is_master() {
            let packager = self.packager.clone();
            match tokio::task::spawn_blocking(move || packager.ensure_archive()).await {
                Ok(Ok(stamp)) => info!("Task archive ready, stamp {}", stamp),
                Ok(Err(e)) => error!("Failed to prepare task archive: {}", e),
                Err(e) => error!("Task archive preparation failed: {}", e),
            }

            info!(
                "Serving {} task definitions from {:?}",
                self.store.discover_specs().len(),
                self.store.root()
            );

            if self.config.watcher.enabled {
                let watcher = TreeWatcher::new(self.packager.clone(), &self.config.watcher);
                let token = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    if let Err(e) = watcher.run(token).await {
                        error!("Tree watcher stopped: {}", e);
                    }
                }));
            } else {
                info!("Task tree watching is disabled");
            }
        }

        let pipeline = self.pipeline.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move { pipeline.resend_loop(token).await }));

        handles
    }

    /// Run until `shutdown` is cancelled, then wait briefly for the loops to stop
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Agent starting as {} on {}:{}",
            if self.is_master() { "master" } else { "worker" },
            self.config.worker.host,
            self.config.worker.port
        );

        let handles = self.start(&shutdown).await;
        shutdown.cancelled().await;

        for handle in handles {
            match timeout(STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Background task ended abnormally: {}", e),
                Err(_) => warn!("Background task did not stop within {:?}", STOP_TIMEOUT),
            }
        }

        info!("Agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrelay_config::PathsConfig;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, is_master: bool) -> TaskRelayConfig {
        let mut config = TaskRelayConfig {
            paths: PathsConfig {
                tasks_dir: dir.path().join("tasks"),
                archive_path: dir.path().join("public/tasks.zip"),
                staging_dir: dir.path().join("temp"),
                ..Default::default()
            },
            ..Default::default()
        };
        config.worker.is_master = is_master;
        config
    }

    #[tokio::test]
    async fn test_master_prepares_archive_and_stops_on_cancel() {
        let temp_dir = TempDir::new().unwrap();
        let context = AgentContext::new(config_in(&temp_dir, true)).unwrap();

        let shutdown = CancellationToken::new();
        let handles = context.start(&shutdown).await;

        assert!(temp_dir.path().join("public/tasks.zip").exists());
        assert!(context.stamp().current().is_some());
        assert_eq!(handles.len(), 2);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_worker_only_runs_resend_loop() {
        let temp_dir = TempDir::new().unwrap();
        let context = AgentContext::new(config_in(&temp_dir, false)).unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        context.run(shutdown).await.unwrap();

        assert!(!temp_dir.path().join("public/tasks.zip").exists());
        assert!(context.stamp().current().is_none());
    }
}
