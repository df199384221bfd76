//! # Denylist Builder
//!
//! One builder run turns newly consumed records into referential lines.
//!
//! ## Run State Machine
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 │ referential file exists? │
//!                 └────────────┬─────────────┘
//!              no              │              yes
//!        ┌─────────────────────┴─────────────────────┐
//!        ▼                                           ▼
//!  reset = earliest                            reset = latest
//!  mode  = create                              mode  = append
//!        │                                     load existing set
//!        └─────────────────────┬─────────────────────┘
//!                              ▼
//!                 drain (single poll | until empty)
//!                              ▼
//!                 extract candidates, drop `app_id`
//!                              ▼
//!                 drop already persisted entries
//!                              ▼
//!                 write (create | append), then commit offsets
//! ```
//!
//! ## Failure Semantics
//!
//! Any error aborts the run before offsets are committed. The write is
//! all-or-nothing (see [`ReferentialWriter`]), so an aborted run leaves
//! the file as it was and the next run sees the same records.
//!
//! ## Known Limitation
//!
//! Latest-mode is only as complete as the consumer group's committed
//! offset. A group that loses its offset while the file exists resumes
//! from the head of the stream and misses what arrived in between.

use crate::error::Result;
use crate::record::Record;
use crate::source::{Batch, OffsetReset, RecordSource, SourceFactory};
use crate::storage::ReferentialWriter;
use dlp_core::{read_digest_set, DenylistConfig, DigestSet, DrainMode};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a run writes the referential file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// The file did not exist; all extracted entries are written.
    Create,
    /// The file existed; only entries not already present are appended.
    Append,
}

impl BuildMode {
    /// Stream position used by this mode.
    #[must_use]
    pub const fn offset_reset(self) -> OffsetReset {
        match self {
            Self::Create => OffsetReset::Earliest,
            Self::Append => OffsetReset::Latest,
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Append => write!(f, "append"),
        }
    }
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Referential file written.
    pub path: PathBuf,
    /// Write mode chosen from the file's existence.
    pub mode: BuildMode,
    /// Polls performed.
    pub polls: u32,
    /// Records decoded from the stream.
    pub consumed: usize,
    /// Distinct candidate entries extracted.
    pub extracted: usize,
    /// Entries written to the file.
    pub written: usize,
}

/// Per-run settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderSettings {
    /// Referential file this builder maintains.
    pub referential_file: PathBuf,
    /// Timeout of one poll.
    pub poll_timeout: Duration,
    /// Drain policy.
    pub drain: DrainMode,
    /// Poll cap for [`DrainMode::UntilEmpty`].
    pub max_polls: u32,
}

impl BuilderSettings {
    /// Settings for `referential_file` with the default drain policy.
    pub fn new(referential_file: impl Into<PathBuf>) -> Self {
        let defaults = DenylistConfig::default();
        Self {
            referential_file: referential_file.into(),
            poll_timeout: defaults.poll_timeout(),
            drain: defaults.drain,
            max_polls: defaults.max_polls,
        }
    }

    /// Settings from the `[denylist]` configuration section.
    #[must_use]
    pub fn from_config(config: &DenylistConfig) -> Self {
        Self {
            referential_file: config.referential_file(),
            poll_timeout: config.poll_timeout(),
            drain: config.drain,
            max_polls: config.max_polls,
        }
    }

    /// Overrides the drain policy.
    #[must_use]
    pub const fn with_drain(mut self, drain: DrainMode) -> Self {
        self.drain = drain;
        self
    }

    /// Overrides the poll cap.
    #[must_use]
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    fn poll_budget(&self) -> u32 {
        match self.drain {
            DrainMode::SinglePoll => 1,
            DrainMode::UntilEmpty => self.max_polls.max(1),
        }
    }
}

/// Builds one application's referential file from a record stream.
///
/// # Example
///
/// ```rust,no_run
/// use dlp_denylist::{BuilderSettings, DenylistBuilder, MemoryTopic};
///
/// let topic = MemoryTopic::new();
/// topic.publish(r#"{"app_id":"app1","value":"5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"}"#);
///
/// let builder = DenylistBuilder::new(
///     topic.connector("logstash-1"),
///     BuilderSettings::new("/pdata/DLP/app1.data"),
/// );
/// let report = builder.run_once()?;
/// println!("{} entries written in {} mode", report.written, report.mode);
/// # Ok::<(), dlp_denylist::DenylistError>(())
/// ```
#[derive(Debug)]
pub struct DenylistBuilder<F> {
    factory: F,
    settings: BuilderSettings,
    writer: Arc<ReferentialWriter>,
}

impl<F: SourceFactory> DenylistBuilder<F> {
    /// Creates a builder on the process-wide [`ReferentialWriter::shared`],
    /// so runs of any two builders on the same file never overlap.
    pub fn new(factory: F, settings: BuilderSettings) -> Self {
        Self::with_writer(factory, settings, ReferentialWriter::shared())
    }

    /// Creates a builder on `writer`. Runs are serialized only against
    /// builders using the same writer.
    pub fn with_writer(
        factory: F,
        settings: BuilderSettings,
        writer: Arc<ReferentialWriter>,
    ) -> Self {
        Self {
            factory,
            settings,
            writer,
        }
    }

    /// Run settings.
    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// Referential file maintained by this builder.
    pub fn referential_file(&self) -> &Path {
        &self.settings.referential_file
    }

    /// Performs one run: choose the mode, drain, dedup, write, commit.
    ///
    /// Blocking; schedule it off latency-sensitive threads.
    ///
    /// # Errors
    ///
    /// Returns the first stream, read or write error. Nothing is written
    /// and no offsets are committed in that case.
    pub fn run_once(&self) -> Result<BuildReport> {
        let start = Instant::now();
        let path = self.settings.referential_file.as_path();

        let lock = self.writer.lock_for(path);
        let _guard = lock.lock();

        let mode = if path.exists() {
            BuildMode::Append
        } else {
            BuildMode::Create
        };
        let existing = match mode {
            BuildMode::Append => read_digest_set(path)?,
            BuildMode::Create => DigestSet::new(),
        };
        debug!(
            "Builder run on {} in {} mode ({} existing entries)",
            path.display(),
            mode,
            existing.len()
        );

        let mut source = self.factory.connect(mode.offset_reset())?;
        let (records, polls) = self.drain(&mut source)?;

        let candidates = extract_candidates(&records);
        let extracted = candidates.len();
        let fresh: Vec<String> = candidates
            .into_iter()
            .filter(|entry| !existing.contains(entry))
            .collect();

        let written = match mode {
            BuildMode::Create if fresh.is_empty() => 0,
            BuildMode::Create => self.writer.create(path, &fresh)?,
            BuildMode::Append => self.writer.append(path, &fresh)?,
        };
        source.commit()?;

        info!(
            "Denylist {} ({}): {} records, {} extracted, {} written in {:?}",
            path.display(),
            mode,
            records.len(),
            extracted,
            written,
            start.elapsed()
        );

        Ok(BuildReport {
            path: path.to_path_buf(),
            mode,
            polls,
            consumed: records.len(),
            extracted,
            written,
        })
    }

    fn drain<S: RecordSource>(&self, source: &mut S) -> Result<(Vec<Record>, u32)> {
        let budget = self.settings.poll_budget();
        let mut records = Vec::new();
        let mut polls = 0;
        let mut skipped = 0;

        while polls < budget {
            let Batch {
                records: batch,
                skipped: batch_skipped,
            } = source.poll(self.settings.poll_timeout)?;
            polls += 1;

            if batch.is_empty() && batch_skipped == 0 {
                break;
            }
            skipped += batch_skipped;
            records.extend(batch);

            if polls == budget && self.settings.drain == DrainMode::UntilEmpty {
                warn!(
                    "Poll cap of {} reached on {}; remaining records wait for the next run",
                    budget,
                    self.settings.referential_file.display()
                );
            }
        }

        if skipped > 0 {
            warn!("{} undecodable records skipped", skipped);
        }
        Ok((records, polls))
    }
}

/// Distinct candidate entries across `records`, in sorted order.
#[must_use]
pub fn extract_candidates(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(Record::candidates)
        .map(str::to_owned)
        .collect()
}
