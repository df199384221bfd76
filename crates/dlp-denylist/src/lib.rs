//! # DLP Denylist Builder
//!
//! Builds the per-application referential files that `dlp-core` masks
//! against, incrementally, from a stream of sensitive-value records.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Record`] | One decoded stream record; `app_id` is never a candidate |
//! | [`RecordSource`] / [`SourceFactory`] | Bounded poll + explicit commit |
//! | [`MemoryTopic`] | In-process topic with per-group offsets |
//! | [`FileTopic`] | JSON-lines spool file with per-group offset files |
//! | [`ReferentialWriter`] | Atomic create, rollback-on-failure append |
//! | [`DenylistBuilder`] | One run: mode, drain, dedup, write, commit |
//! | [`BuilderJob`] | Interval-scheduled runs on the blocking pool |
//!
//! ## Architecture
//!
//! ```text
//!   stream ──poll──▶ DenylistBuilder ──create/append──▶ <hash_path><code>.data
//!     ▲                    │                                    │
//!     └──────commit────────┘                                    ▼
//!                                                   dlp_core::ReferentialCache
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use dlp_denylist::{BuildMode, BuilderSettings, DenylistBuilder, MemoryTopic};
//!
//! let dir = tempfile::TempDir::new()?;
//! let topic = MemoryTopic::new();
//! topic.publish(r#"{"app_id":"app1","card":"4111111111111111"}"#);
//!
//! let builder = DenylistBuilder::new(
//!     topic.connector("logstash-1"),
//!     BuilderSettings::new(dir.path().join("app1.data")),
//! );
//! let report = builder.run_once()?;
//! assert_eq!(report.mode, BuildMode::Create);
//! assert_eq!(report.written, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Security Notes
//!
//! - Record values are written verbatim; the producer is expected to send
//!   digests computed with the same algorithm the masking side uses.
//! - Offsets are committed only after the file write succeeded.

mod builder;
mod error;
mod job;
#[cfg(feature = "kafka")]
mod kafka;
mod record;
mod source;
mod spool;
mod storage;

pub use builder::{extract_candidates, BuildMode, BuildReport, BuilderSettings, DenylistBuilder};
pub use error::{DenylistError, Result};
pub use job::{BuilderJob, JobSummary};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConnector, KafkaSource};
pub use record::{Record, RESERVED_KEY};
pub use source::{
    Batch, MemoryConnector, MemoryConsumer, MemoryTopic, OffsetReset, RecordSource, SourceFactory,
    DEFAULT_MAX_BATCH,
};
pub use spool::{FileConsumer, FileTopic};
pub use storage::ReferentialWriter;
