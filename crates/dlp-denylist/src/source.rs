//! # Record Source Adapter
//!
//! The builder reads records through two small traits:
//!
//! - [`SourceFactory`] opens a consumer for one run, choosing where an
//!   uncommitted consumer group starts ([`OffsetReset`]).
//! - [`RecordSource`] polls batches with a bounded timeout and commits the
//!   consumed position once the run's output has been persisted.
//!
//! Offsets follow broker semantics: the reset policy only applies when the
//! group has no committed offset. Committing after the write means an
//! aborted run leaves the records in place for the next one.
//!
//! [`MemoryTopic`] is an in-process implementation with those semantics.

use crate::error::Result;
use crate::record::Record;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default upper bound on records returned by one poll.
pub const DEFAULT_MAX_BATCH: usize = 500;

/// Where a consumer group without a committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// From the oldest retained record.
    Earliest,
    /// From the next record to arrive.
    Latest,
}

impl OffsetReset {
    /// Broker configuration value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records returned by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Successfully decoded records.
    pub records: Vec<Record>,
    /// Payloads fetched but not decodable.
    pub skipped: usize,
}

impl Batch {
    /// Decodes raw payloads, counting the ones that fail.
    pub fn from_payloads<'a, I>(payloads: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut batch = Self::default();
        for payload in payloads {
            batch.push_payload(payload);
        }
        batch
    }

    /// Decodes and appends one payload.
    pub fn push_payload(&mut self, payload: &[u8]) {
        match Record::from_payload(payload) {
            Ok(record) => self.records.push(record),
            Err(e) => {
                warn!("Skipping record: {}", e);
                self.skipped += 1;
            }
        }
    }

    /// Returns `true` if the poll fetched nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.skipped == 0
    }

    /// Payloads fetched, decodable or not.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.records.len() + self.skipped
    }
}

/// A consumer positioned on the denylist stream.
pub trait RecordSource {
    /// Fetches the next batch, waiting at most `timeout` for the first record.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream fails.
    fn poll(&mut self, timeout: Duration) -> Result<Batch>;

    /// Commits everything polled so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the position cannot be stored.
    fn commit(&mut self) -> Result<()>;
}

/// Opens a [`RecordSource`] for one builder run.
pub trait SourceFactory: Send + Sync {
    /// The consumer type.
    type Source: RecordSource;

    /// Connects with the given reset policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is unreachable.
    fn connect(&self, reset: OffsetReset) -> Result<Self::Source>;
}

#[derive(Debug, Default)]
struct TopicLog {
    payloads: Vec<Vec<u8>>,
    committed: HashMap<String, usize>,
}

/// In-process topic with per-group committed offsets.
///
/// Cloning yields another handle to the same log.
///
/// # Example
///
/// ```rust
/// use dlp_denylist::{MemoryTopic, OffsetReset, RecordSource, SourceFactory};
/// use std::time::Duration;
///
/// let topic = MemoryTopic::new();
/// topic.publish(r#"{"app_id":"app1","card":"4111111111111111"}"#);
///
/// let mut consumer = topic.connector("group-1").connect(OffsetReset::Earliest)?;
/// let batch = consumer.poll(Duration::from_millis(100))?;
/// assert_eq!(batch.records.len(), 1);
/// consumer.commit()?;
/// # Ok::<(), dlp_denylist::DenylistError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTopic {
    log: Arc<Mutex<TopicLog>>,
}

impl MemoryTopic {
    /// Creates an empty topic.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one payload.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) {
        self.log.lock().payloads.push(payload.into());
    }

    /// Appends a JSON value as one payload.
    pub fn publish_json(&self, value: &serde_json::Value) {
        self.publish(value.to_string());
    }

    /// Number of payloads ever published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().payloads.len()
    }

    /// Returns `true` if nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed offset of `group_id`, if any.
    #[must_use]
    pub fn committed(&self, group_id: &str) -> Option<usize> {
        self.log.lock().committed.get(group_id).copied()
    }

    /// A factory opening consumers in `group_id`.
    #[must_use]
    pub fn connector(&self, group_id: impl Into<String>) -> MemoryConnector {
        MemoryConnector {
            topic: self.clone(),
            group_id: group_id.into(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// [`SourceFactory`] for a [`MemoryTopic`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    topic: MemoryTopic,
    group_id: String,
    max_batch: usize,
}

impl MemoryConnector {
    /// Caps the records returned per poll.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

impl SourceFactory for MemoryConnector {
    type Source = MemoryConsumer;

    fn connect(&self, reset: OffsetReset) -> Result<MemoryConsumer> {
        let log = self.topic.log.lock();
        let position = match log.committed.get(&self.group_id) {
            Some(&offset) => offset,
            None => match reset {
                OffsetReset::Earliest => 0,
                OffsetReset::Latest => log.payloads.len(),
            },
        };
        drop(log);

        Ok(MemoryConsumer {
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
            position,
            max_batch: self.max_batch,
        })
    }
}

/// Consumer over a [`MemoryTopic`].
#[derive(Debug)]
pub struct MemoryConsumer {
    topic: MemoryTopic,
    group_id: String,
    position: usize,
    max_batch: usize,
}

impl RecordSource for MemoryConsumer {
    fn poll(&mut self, _timeout: Duration) -> Result<Batch> {
        let log = self.topic.log.lock();
        let end = (self.position + self.max_batch).min(log.payloads.len());
        let batch = Batch::from_payloads(
            log.payloads[self.position..end]
                .iter()
                .map(Vec::as_slice),
        );
        self.position = end;
        Ok(batch)
    }

    fn commit(&mut self) -> Result<()> {
        self.topic
            .log
            .lock()
            .committed
            .insert(self.group_id.clone(), self.position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_earliest_reads_history() {
        let topic = MemoryTopic::new();
        topic.publish(r#"{"v":"a"}"#);
        topic.publish(r#"{"v":"b"}"#);

        let mut consumer = topic.connector("g").connect(OffsetReset::Earliest).unwrap();
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 2);
        assert!(consumer.poll(TIMEOUT).unwrap().is_empty());
    }

    #[test]
    fn test_latest_skips_history() {
        let topic = MemoryTopic::new();
        topic.publish(r#"{"v":"a"}"#);

        let mut consumer = topic.connector("g").connect(OffsetReset::Latest).unwrap();
        assert!(consumer.poll(TIMEOUT).unwrap().is_empty());

        topic.publish(r#"{"v":"b"}"#);
        let batch = consumer.poll(TIMEOUT).unwrap();
        assert_eq!(batch.records[0].get("v"), Some("b"));
    }

    #[test]
    fn test_committed_offset_overrides_reset() {
        let topic = MemoryTopic::new();
        topic.publish(r#"{"v":"a"}"#);

        let mut first = topic.connector("g").connect(OffsetReset::Latest).unwrap();
        first.poll(TIMEOUT).unwrap();
        first.commit().unwrap();
        assert_eq!(topic.committed("g"), Some(1));

        topic.publish(r#"{"v":"b"}"#);
        let mut second = topic.connector("g").connect(OffsetReset::Earliest).unwrap();
        let batch = second.poll(TIMEOUT).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].get("v"), Some("b"));
    }

    #[test]
    fn test_uncommitted_poll_is_replayed() {
        let topic = MemoryTopic::new();
        topic.publish(r#"{"v":"a"}"#);

        let mut first = topic.connector("g").connect(OffsetReset::Earliest).unwrap();
        assert_eq!(first.poll(TIMEOUT).unwrap().records.len(), 1);
        drop(first);

        let mut second = topic.connector("g").connect(OffsetReset::Earliest).unwrap();
        assert_eq!(second.poll(TIMEOUT).unwrap().records.len(), 1);
    }

    #[test]
    fn test_groups_are_independent() {
        let topic = MemoryTopic::new();
        topic.publish(r#"{"v":"a"}"#);

        let mut a = topic.connector("a").connect(OffsetReset::Earliest).unwrap();
        a.poll(TIMEOUT).unwrap();
        a.commit().unwrap();

        let mut b = topic.connector("b").connect(OffsetReset::Earliest).unwrap();
        assert_eq!(b.poll(TIMEOUT).unwrap().records.len(), 1);
    }

    #[test]
    fn test_max_batch_and_skipped_payloads() {
        let topic = MemoryTopic::new();
        topic.publish("garbage");
        for i in 0..5 {
            topic.publish(format!(r#"{{"v":"{}"}}"#, i));
        }

        let mut consumer = topic
            .connector("g")
            .with_max_batch(2)
            .connect(OffsetReset::Earliest)
            .unwrap();

        let first = consumer.poll(TIMEOUT).unwrap();
        assert_eq!(first.skipped, 1);
        assert_eq!(first.records.len(), 1);
        assert_eq!(first.fetched(), 2);
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 2);
        assert_eq!(consumer.poll(TIMEOUT).unwrap().records.len(), 2);
        assert!(consumer.poll(TIMEOUT).unwrap().is_empty());
    }
}
