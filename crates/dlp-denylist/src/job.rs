//! Periodically scheduled builder runs.
//!
//! The job owns a [`DenylistBuilder`] and runs it on the blocking pool at a
//! fixed interval, independent of any masking traffic. A failed run is
//! logged and simply retried on the next tick.

use crate::builder::DenylistBuilder;
use crate::error::DenylistError;
use crate::source::SourceFactory;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

/// Totals over the lifetime of a [`BuilderJob`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    /// Runs attempted.
    pub runs: u64,
    /// Runs that returned an error.
    pub failures: u64,
    /// Entries written across all successful runs.
    pub written: u64,
}

/// Runs a builder every `interval` until shut down.
///
/// The first run starts immediately.
#[derive(Debug)]
pub struct BuilderJob<F> {
    builder: Arc<DenylistBuilder<F>>,
    interval: Duration,
}

impl<F> BuilderJob<F>
where
    F: SourceFactory + 'static,
{
    /// Schedules `builder` every `interval`. A zero interval is raised to
    /// one millisecond.
    pub fn new(builder: DenylistBuilder<F>, interval: Duration) -> Self {
        Self {
            builder: Arc::new(builder),
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Spawns the job on the current runtime.
    ///
    /// Send `true` on the paired [`watch::Sender`] (or drop it) to stop.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<JobSummary> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> JobSummary {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = JobSummary::default();

        info!(
            "Builder job started for {} every {:?}",
            self.builder.referential_file().display(),
            self.interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            summary.runs += 1;
            match self.run_blocking().await {
                Ok(written) => summary.written += written as u64,
                Err(e) => {
                    summary.failures += 1;
                    error!(
                        "Builder run on {} aborted: {}",
                        self.builder.referential_file().display(),
                        e
                    );
                }
            }
        }

        info!(
            "Builder job stopped after {} runs ({} failed, {} entries written)",
            summary.runs, summary.failures, summary.written
        );
        summary
    }

    async fn run_blocking(&self) -> Result<usize, DenylistError> {
        let builder = Arc::clone(&self.builder);
        let report = tokio::task::spawn_blocking(move || builder.run_once())
            .await
            .map_err(|e| DenylistError::Task(e.to_string()))??;
        Ok(report.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderSettings;
    use crate::source::MemoryTopic;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stops_on_shutdown_signal() {
        let dir = TempDir::new().unwrap();
        let topic = MemoryTopic::new();
        let builder = DenylistBuilder::new(
            topic.connector("g"),
            BuilderSettings::new(dir.path().join("app1.data")),
        );

        let (tx, rx) = watch::channel(true);
        let summary = BuilderJob::new(builder, Duration::from_secs(3600)).run(rx).await;
        drop(tx);
        assert_eq!(summary, JobSummary::default());
    }

    #[tokio::test]
    async fn test_stops_when_sender_dropped() {
        let dir = TempDir::new().unwrap();
        let topic = MemoryTopic::new();
        let builder = DenylistBuilder::new(
            topic.connector("g"),
            BuilderSettings::new(dir.path().join("app1.data")),
        );

        let (tx, rx) = watch::channel(false);
        let handle = BuilderJob::new(builder, Duration::from_secs(3600)).spawn(rx);
        drop(tx);

        let summary = handle.await.unwrap();
        assert!(summary.runs <= 1);
        assert_eq!(summary.failures, 0);
    }
}
