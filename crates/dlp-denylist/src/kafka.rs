//! Kafka record source (feature `kafka`).
//!
//! Offsets are committed explicitly after the builder has persisted a run,
//! never by the client's auto-commit.
//!
//! A fresh consumer owns no partitions until its group join completes, and
//! a poll before that returns nothing. [`KafkaConnector::connect`] therefore
//! waits for the assignment (bounded by `join_timeout_ms`) before handing
//! the source to the builder. Records delivered while waiting are kept and
//! returned by the first poll.

use crate::error::{DenylistError, Result};
use crate::source::{Batch, OffsetReset, RecordSource, SourceFactory, DEFAULT_MAX_BATCH};
use dlp_core::StreamConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use std::time::{Duration, Instant};
use tracing::debug;

const JOIN_POLL: Duration = Duration::from_millis(100);

/// Opens Kafka consumers for the denylist topic.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    brokers: String,
    topic: String,
    group_id: String,
    join_timeout: Duration,
    max_batch: usize,
}

impl KafkaConnector {
    /// Connector for the `[denylist.stream]` settings.
    #[must_use]
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            brokers: config.brokers.clone(),
            topic: config.topic.clone(),
            group_id: config.group_id.clone(),
            join_timeout: config.join_timeout(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Caps the records returned per poll.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    fn await_assignment(&self, consumer: &BaseConsumer) -> Result<Batch> {
        let deadline = Instant::now() + self.join_timeout;
        let mut early = Batch::default();

        loop {
            if consumer.assignment()?.count() > 0 {
                return Ok(early);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DenylistError::Source(format!(
                    "no partition of {} assigned to '{}' within {:?}",
                    self.topic, self.group_id, self.join_timeout
                )));
            }
            if let Some(message) = consumer.poll(JOIN_POLL.min(deadline - now)) {
                accept(&mut early, message)?;
            }
        }
    }
}

impl SourceFactory for KafkaConnector {
    type Source = KafkaSource;

    fn connect(&self, reset: OffsetReset) -> Result<KafkaSource> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", reset.as_str())
            .set("enable.auto.commit", "false")
            .create()?;
        consumer.subscribe(&[self.topic.as_str()])?;

        let started = Instant::now();
        let pending = self.await_assignment(&consumer)?;
        debug!(
            "Joined {} on {} as '{}' (reset {}) in {:?}",
            self.topic,
            self.brokers,
            self.group_id,
            reset,
            started.elapsed()
        );

        Ok(KafkaSource {
            consumer,
            max_batch: self.max_batch,
            pending,
            polled: false,
        })
    }
}

/// A subscribed Kafka consumer with its partitions assigned.
pub struct KafkaSource {
    consumer: BaseConsumer,
    max_batch: usize,
    pending: Batch,
    polled: bool,
}

impl RecordSource for KafkaSource {
    fn poll(&mut self, timeout: Duration) -> Result<Batch> {
        let mut batch = std::mem::take(&mut self.pending);
        let mut wait = if batch.is_empty() {
            timeout
        } else {
            Duration::ZERO
        };

        while batch.fetched() < self.max_batch {
            let Some(message) = self.consumer.poll(wait) else {
                break;
            };
            wait = Duration::ZERO;
            accept(&mut batch, message)?;
        }

        self.polled = true;
        Ok(batch)
    }

    fn commit(&mut self) -> Result<()> {
        if !self.polled {
            return Ok(());
        }
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Adds one poll result to `batch`. Any consumer error other than reaching
/// the end of a partition aborts the run.
fn accept(
    batch: &mut Batch,
    message: std::result::Result<BorrowedMessage<'_>, KafkaError>,
) -> Result<()> {
    match message {
        Ok(message) => {
            match message.payload() {
                Some(payload) => batch.push_payload(payload),
                None => batch.skipped += 1,
            }
            Ok(())
        }
        Err(e) if is_end_of_partition(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn is_end_of_partition(error: &KafkaError) -> bool {
    matches!(error, KafkaError::PartitionEOF(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_partition_eof_is_tolerated() {
        assert!(is_end_of_partition(&KafkaError::PartitionEOF(0)));
        assert!(!is_end_of_partition(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::BrokerTransportFailure
        )));
    }

    #[test]
    fn test_consumer_error_aborts() {
        let mut batch = Batch::default();
        let failed = accept(
            &mut batch,
            Err(KafkaError::MessageConsumption(
                RDKafkaErrorCode::UnknownTopicOrPartition,
            )),
        );
        assert!(matches!(failed, Err(DenylistError::Kafka(_))));
        assert!(accept(&mut batch, Err(KafkaError::PartitionEOF(3))).is_ok());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_unreachable_broker_fails_to_join() {
        let config = StreamConfig {
            brokers: "127.0.0.1:1".to_string(),
            join_timeout_ms: 300,
            ..StreamConfig::default()
        };
        let started = Instant::now();
        assert!(KafkaConnector::from_config(&config)
            .connect(OffsetReset::Earliest)
            .is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
