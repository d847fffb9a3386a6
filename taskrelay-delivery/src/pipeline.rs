//! Store-and-forward delivery of execution records
//!
//! `report` stages a record, tries to send it right away and unstages it on
//! success. Whatever stays staged is retried by the periodic resend sweep.
//! The master deduplicates on record id, so a record sent twice is harmless.

use std::sync::Arc;
use std::time::Duration;
use taskrelay_config::TaskRelayConfig;
use taskrelay_core::ExecutionRecord;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::ResultBuffer;
use crate::error::{DeliveryError, Result};
use crate::sender::{HttpSender, RecordSender};

/// Temporary files older than this belong to a stage that never finished
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// What happened to a reported record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The master acknowledged it and the staged copy is gone
    Delivered,
    /// Sending failed; the record waits in the buffer under this name
    Buffered { name: String },
}

/// Counts from one pass over the buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub sent: usize,
    pub failed: usize,
    /// Files that vanished or no longer decode as records
    pub skipped: usize,
}

#[derive(Clone)]
pub struct DeliveryPipeline {
    buffer: ResultBuffer,
    sender: Arc<dyn RecordSender>,
    resend_interval: Duration,
    item_delay: Duration,
}

impl DeliveryPipeline {
    pub fn new(
        buffer: ResultBuffer,
        sender: Arc<dyn RecordSender>,
        resend_interval: Duration,
        item_delay: Duration,
    ) -> Self {
        Self {
            buffer,
            sender,
            resend_interval,
            item_delay,
        }
    }

    /// Pipeline posting to the configured master through [`HttpSender`]
    pub fn from_config(config: &TaskRelayConfig) -> Result<Self> {
        let sender = HttpSender::from_config(&config.master, &config.delivery)?;
        Ok(Self::new(
            ResultBuffer::from_config(&config.paths),
            Arc::new(sender),
            config.delivery.resend_interval,
            config.delivery.item_delay,
        ))
    }

    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    /// Names of records still waiting for delivery
    pub fn pending(&self) -> Result<Vec<String>> {
        self.buffer.pending()
    }

    /// Stage, send, and unstage one record.
    ///
    /// Fails only when the record cannot be staged. A failed send leaves the
    /// record for the resend sweep.
    pub async fn report(&self, record: &ExecutionRecord) -> Result<ReportOutcome> {
        let body = record.to_json()?;
        let name = self.buffer.stage_bytes(record.completed(), &body)?;

        match self.sender.send(&body).await {
            Ok(()) => {
                if let Err(e) = self.buffer.unstage(&name) {
                    warn!("Delivered record {} but could not unstage it: {}", name, e);
                }
                debug!("Record {} ({}) delivered", record.id(), name);
                Ok(ReportOutcome::Delivered)
            }
            Err(e) => {
                warn!(
                    "Could not deliver record {} to {}, keeping {}: {}",
                    record.id(),
                    self.sender.endpoint(),
                    name,
                    e
                );
                Ok(ReportOutcome::Buffered { name })
            }
        }
    }

    /// One full pass over the buffer, without pauses between records
    pub async fn sweep_once(&self) -> SweepSummary {
        self.sweep(Duration::ZERO, &CancellationToken::new()).await
    }

    /// Retry buffered records every `resend_interval` until cancelled
    pub async fn resend_loop(&self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.resend_interval, self.resend_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Resend sweep every {:?} towards {}",
            self.resend_interval,
            self.sender.endpoint()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Resend loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = self.sweep(self.item_delay, &shutdown).await;
                    if summary != SweepSummary::default() {
                        info!(
                            "Resend sweep: {} sent, {} failed, {} skipped",
                            summary.sent, summary.failed, summary.skipped
                        );
                    }
                }
            }
        }
    }

    async fn sweep(&self, item_delay: Duration, shutdown: &CancellationToken) -> SweepSummary {
        let mut summary = SweepSummary::default();

        match self.buffer.purge_stale_temp(STALE_TEMP_AGE) {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} unfinished staging files", removed),
            Err(e) => warn!("Failed to purge unfinished staging files: {}", e),
        }

        let names = match self.buffer.pending() {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list staged records in {:?}: {}", self.buffer.dir(), e);
                return summary;
            }
        };

        for (i, name) in names.iter().enumerate() {
            if i > 0 && !item_delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(item_delay) => {}
                }
            }
            if shutdown.is_cancelled() {
                break;
            }

            match self.resend(name).await {
                Ok(true) => summary.sent += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!("Resend of {} failed: {}", name, e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Ok(false) when the record is gone or unreadable as a record
    async fn resend(&self, name: &str) -> Result<bool> {
        let body = match self.buffer.read(name) {
            Ok(body) => body,
            Err(DeliveryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        if let Err(e) = ExecutionRecord::from_json(&body) {
            warn!("Staged file {} is not a valid record, leaving it: {}", name, e);
            return Ok(false);
        }

        self.sender.send(&body).await?;
        if let Err(e) = self.buffer.unstage(name) {
            warn!("Resent record {} but could not unstage it: {}", name, e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use taskrelay_core::{ExecutionOutcome, TaskDefinition};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSender {
        down: AtomicBool,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeSender {
        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn delivered(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RecordSender for FakeSender {
        async fn send(&self, body: &[u8]) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(DeliveryError::Network {
                    url: "fake".to_string(),
                    error: "connection refused".to_string(),
                });
            }
            self.bodies.lock().unwrap().push(body.to_vec());
            Ok(())
        }

        fn endpoint(&self) -> &str {
            "fake"
        }
    }

    fn record(id: &str) -> ExecutionRecord {
        ExecutionRecord::new(id, TaskDefinition::new("nightly")).with_outcome(ExecutionOutcome {
            hostname: "worker-1".to_string(),
            completed: "20240301020304".to_string(),
            exit_code: 1,
            ..Default::default()
        })
    }

    fn pipeline(dir: &TempDir, sender: Arc<FakeSender>) -> DeliveryPipeline {
        DeliveryPipeline::new(
            ResultBuffer::new(dir.path().join("temp")),
            sender,
            Duration::from_secs(3600),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_successful_report_leaves_nothing_staged() {
        let temp_dir = TempDir::new().unwrap();
        let sender = Arc::new(FakeSender::default());
        let pipeline = pipeline(&temp_dir, sender.clone());

        let outcome = pipeline.report(&record("a")).await.unwrap();

        assert_eq!(outcome, ReportOutcome::Delivered);
        assert!(pipeline.pending().unwrap().is_empty());
        assert_eq!(sender.delivered(), 1);
    }

    #[tokio::test]
    async fn test_failed_report_keeps_exact_record() {
        let temp_dir = TempDir::new().unwrap();
        let sender = Arc::new(FakeSender::default());
        sender.set_down(true);
        let pipeline = pipeline(&temp_dir, sender.clone());
        let rec = record("b");

        let outcome = pipeline.report(&rec).await.unwrap();

        let ReportOutcome::Buffered { name } = outcome else {
            panic!("expected the record to be buffered");
        };
        assert_eq!(pipeline.pending().unwrap(), vec![name.clone()]);
        assert_eq!(pipeline.buffer().load(&name).unwrap(), rec);
    }

    #[tokio::test]
    async fn test_report_fails_when_staging_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("temp");
        std::fs::write(&blocker, "a file where the staging dir should be").unwrap();

        let sender = Arc::new(FakeSender::default());
        let pipeline = pipeline(&temp_dir, sender.clone());

        assert!(pipeline.report(&record("c")).await.is_err());
        assert_eq!(sender.delivered(), 0);
    }

    #[tokio::test]
    async fn test_sweep_delivers_after_master_recovers() {
        let temp_dir = TempDir::new().unwrap();
        let sender = Arc::new(FakeSender::default());
        sender.set_down(true);
        let pipeline = pipeline(&temp_dir, sender.clone());

        pipeline.report(&record("d1")).await.unwrap();
        pipeline.report(&record("d2")).await.unwrap();

        let summary = pipeline.sweep_once().await;
        assert_eq!(summary, SweepSummary { sent: 0, failed: 2, skipped: 0 });
        assert_eq!(pipeline.pending().unwrap().len(), 2);

        sender.set_down(false);
        let summary = pipeline.sweep_once().await;
        assert_eq!(summary, SweepSummary { sent: 2, failed: 0, skipped: 0 });
        assert!(pipeline.pending().unwrap().is_empty());
        assert_eq!(sender.delivered(), 2);
    }

    #[tokio::test]
    async fn test_sweep_skips_undecodable_files() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("temp");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("20240101000000"), b"not json").unwrap();

        let sender = Arc::new(FakeSender::default());
        let pipeline = pipeline(&temp_dir, sender.clone());

        let summary = pipeline.sweep_once().await;
        assert_eq!(summary, SweepSummary { sent: 0, failed: 0, skipped: 1 });
        assert!(staging.join("20240101000000").exists());
    }

    /// Swaps every staged file for a directory of the same name, so the
    /// following unstage cannot remove it
    struct LockingSender {
        staging: std::path::PathBuf,
    }

    #[async_trait]
    impl RecordSender for LockingSender {
        async fn send(&self, _body: &[u8]) -> Result<()> {
            for entry in std::fs::read_dir(&self.staging)? {
                let path = entry?.path();
                std::fs::remove_file(&path)?;
                std::fs::create_dir(&path)?;
                std::fs::write(path.join("held"), "x")?;
            }
            Ok(())
        }

        fn endpoint(&self) -> &str {
            "locking"
        }
    }

    #[tokio::test]
    async fn test_report_is_delivered_even_if_unstage_fails() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("temp");
        let pipeline = DeliveryPipeline::new(
            ResultBuffer::new(&staging),
            Arc::new(LockingSender { staging: staging.clone() }),
            Duration::from_secs(3600),
            Duration::ZERO,
        );

        let outcome = pipeline.report(&record("f")).await.unwrap();

        assert_eq!(outcome, ReportOutcome::Delivered);
        let left: Vec<_> = std::fs::read_dir(&staging)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(left.len(), 1);
        assert!(crate::buffer::is_staged_name(&left[0]));
    }

    #[tokio::test]
    async fn test_sweep_delivers_record_with_null_lists() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("temp");
        std::fs::create_dir_all(&staging).unwrap();
        let body = r#"{"id":"old-1","key":"","name":"nightly","description":"","cmd":"run.bat","schedule":"","machine":null,"chain":null,"error":"","onErrorStop":"","assets":null,"route":null,"group":"","tags":null,"hostname":"w1","started":"","completed":"202403010203041","duration":"","exitCode":0,"output":"","durationInt":"","resolved":""}"#;
        std::fs::write(staging.join("202403010203041"), body).unwrap();

        let sender = Arc::new(FakeSender::default());
        let pipeline = pipeline(&temp_dir, sender.clone());

        let summary = pipeline.sweep_once().await;
        assert_eq!(summary, SweepSummary { sent: 1, failed: 0, skipped: 0 });
        assert!(pipeline.pending().unwrap().is_empty());
        assert_eq!(sender.bodies.lock().unwrap()[0], body.as_bytes());
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("temp");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join(".20240101000000-aaaaaaaa.tmp"), "{").unwrap();

        let sender = Arc::new(FakeSender::default());
        let pipeline = pipeline(&temp_dir, sender.clone());

        assert_eq!(pipeline.sweep_once().await, SweepSummary::default());
        assert!(staging.join(".20240101000000-aaaaaaaa.tmp").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_loop_runs_on_interval_and_stops_on_cancel() {
        let temp_dir = TempDir::new().unwrap();
        let sender = Arc::new(FakeSender::default());
        sender.set_down(true);
        let pipeline = pipeline(&temp_dir, sender.clone());
        pipeline.report(&record("e")).await.unwrap();
        sender.set_down(false);

        let shutdown = CancellationToken::new();
        let handle = {
            let pipeline = pipeline.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { pipeline.resend_loop(shutdown).await })
        };

        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert_eq!(sender.delivered(), 0);

        tokio::time::sleep(Duration::from_secs(1801)).await;
        assert_eq!(sender.delivered(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
