//! Configuration types for DLP masking and denylist building.
//!
//! Loaded from a single TOML document. Every field has a default, so an
//! empty document is a valid configuration.
//!
//! ```toml
//! [processor]
//! source_field = "message"
//! hash_path = "/pdata/DLP/"
//! hashing_algorithm = "SHA256"
//! application_code_field = "elk"
//! on_load_failure = "fail_open"
//!
//! [denylist]
//! hash_path = "/pdata/DLP/"
//! application_code = "app1"
//! drain = "until_empty"
//!
//! [denylist.stream]
//! brokers = "kafka:9092"
//! topic = "wm_hashed_data"
//! group_id = "logstash-1"
//! ```

use crate::digest::HashAlgorithm;
use crate::mask::DEFAULT_PLACEHOLDER;
use crate::referential::referential_path;
use crate::{error::DlpError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default directory prefix for referential files.
pub const DEFAULT_HASH_PATH: &str = "/pdata/DLP/";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DlpConfig {
    /// Token masking filter.
    pub processor: ProcessorConfig,

    /// Whole-field hashing filter.
    pub hash_filter: HashFilterConfig,

    /// Denylist builder.
    pub denylist: DenylistConfig,
}

impl DlpConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`DlpError::ConfigParse`] on malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an I/O, parse or validation error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DlpError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot work at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DlpError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("processor.source_field", &self.processor.source_field)?;
        require_non_empty(
            "processor.application_code_field",
            &self.processor.application_code_field,
        )?;
        require_non_empty("hash_filter.source_field", &self.hash_filter.source_field)?;
        require_non_empty("denylist.application_code", &self.denylist.application_code)?;
        require_non_empty("denylist.stream.topic", &self.denylist.stream.topic)?;
        require_non_empty("denylist.stream.group_id", &self.denylist.stream.group_id)?;

        if self.denylist.poll_timeout_ms == 0 {
            return Err(DlpError::InvalidConfig(
                "denylist.poll_timeout_ms must be positive".to_string(),
            ));
        }
        if self.denylist.max_polls == 0 {
            return Err(DlpError::InvalidConfig(
                "denylist.max_polls must be positive".to_string(),
            ));
        }
        if self.denylist.stream.join_timeout_ms == 0 {
            return Err(DlpError::InvalidConfig(
                "denylist.stream.join_timeout_ms must be positive".to_string(),
            ));
        }
        if self.denylist.interval_secs == 0 {
            return Err(DlpError::InvalidConfig(
                "denylist.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DlpError::InvalidConfig(format!("{} must not be empty", name)));
    }
    Ok(())
}

/// What masking does when a referential file cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Leave the field unmasked.
    #[default]
    FailOpen,
    /// Mask every token of the field.
    FailClosed,
}

/// Token masking filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Plugin instance identifier.
    pub id: String,

    /// Field to inspect and mask.
    pub source_field: String,

    /// Directory prefix of the referential files.
    pub hash_path: String,

    /// Digest algorithm; must match the one that produced the denylist.
    pub hashing_algorithm: HashAlgorithm,

    /// Field naming the event's application code.
    pub application_code_field: String,

    /// Application code used when the event does not carry one.
    pub default_application_code: Option<String>,

    /// Masking character.
    pub placeholder: char,

    /// Behaviour when a referential cannot be loaded.
    pub on_load_failure: LoadFailurePolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            id: "dlp_processor".to_string(),
            source_field: "message".to_string(),
            hash_path: DEFAULT_HASH_PATH.to_string(),
            hashing_algorithm: HashAlgorithm::Sha256,
            application_code_field: "elk".to_string(),
            default_application_code: None,
            placeholder: DEFAULT_PLACEHOLDER,
            on_load_failure: LoadFailurePolicy::FailOpen,
        }
    }
}

/// Whole-field hashing filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashFilterConfig {
    /// Plugin instance identifier.
    pub id: String,

    /// Field replaced by its digest.
    pub source_field: String,

    /// Digest algorithm.
    pub hashing_algorithm: HashAlgorithm,
}

impl Default for HashFilterConfig {
    fn default() -> Self {
        Self {
            id: "dlp_encryptor".to_string(),
            source_field: "message".to_string(),
            hashing_algorithm: HashAlgorithm::Sha256,
        }
    }
}

/// How many polls one builder run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// One bounded poll per run (best effort).
    SinglePoll,
    /// Poll until an empty batch or `max_polls` is reached.
    #[default]
    UntilEmpty,
}

/// Denylist builder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenylistConfig {
    /// Directory prefix of the referential files.
    pub hash_path: String,

    /// Application code whose referential this builder maintains.
    pub application_code: String,

    /// Explicit referential file, overriding `hash_path` + code.
    pub referential_file: Option<PathBuf>,

    /// Timeout of a single stream poll, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Drain policy per run.
    pub drain: DrainMode,

    /// Poll cap for [`DrainMode::UntilEmpty`].
    pub max_polls: u32,

    /// Interval between scheduled runs, in seconds.
    pub interval_secs: u64,

    /// Record stream settings.
    pub stream: StreamConfig,
}

impl DenylistConfig {
    /// The referential file this builder writes.
    #[must_use]
    pub fn referential_file(&self) -> PathBuf {
        self.referential_file
            .clone()
            .unwrap_or_else(|| referential_path(&self.hash_path, &self.application_code))
    }

    /// Single poll timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Interval between scheduled runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for DenylistConfig {
    fn default() -> Self {
        Self {
            hash_path: DEFAULT_HASH_PATH.to_string(),
            application_code: "app".to_string(),
            referential_file: None,
            poll_timeout_ms: 100,
            drain: DrainMode::UntilEmpty,
            max_polls: 64,
            interval_secs: 60,
            stream: StreamConfig::default(),
        }
    }
}

/// Record stream connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Broker bootstrap address.
    pub brokers: String,

    /// Topic carrying sensitive-value records.
    pub topic: String,

    /// Consumer group id.
    pub group_id: String,

    /// JSON-lines spool file used instead of a broker when set.
    pub spool_path: Option<PathBuf>,

    /// How long a new broker consumer waits for its partition assignment
    /// before the run is aborted, in milliseconds.
    pub join_timeout_ms: u64,
}

impl StreamConfig {
    /// Partition assignment deadline of a new broker consumer.
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            brokers: "kafka:9092".to_string(),
            topic: "wm_hashed_data".to_string(),
            group_id: "logstash-1".to_string(),
            spool_path: None,
            join_timeout_ms: 10_000,
        }
    }
}
