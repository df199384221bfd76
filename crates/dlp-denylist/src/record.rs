//! Records consumed from the denylist stream.
//!
//! Each payload is a flat JSON object. Every string value except the
//! reserved `app_id` key is a candidate denylist entry.

use crate::error::{DenylistError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Key identifying the producing application; never a candidate.
pub const RESERVED_KEY: &str = "app_id";

/// One consumed record: field name to string value, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Decodes a JSON object payload.
    ///
    /// Non-string values are dropped; they cannot be denylist entries.
    ///
    /// # Errors
    ///
    /// Returns [`DenylistError::Payload`] if the payload is not a JSON object.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| DenylistError::Payload(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(DenylistError::Payload(
                "payload is not a JSON object".to_string(),
            ));
        };

        let mut fields = BTreeMap::new();
        for (key, value) in map {
            match value {
                Value::String(s) => {
                    fields.insert(key, s);
                }
                other => debug!("Skipping non-string field '{}': {}", key, other),
            }
        }
        Ok(Self { fields })
    }

    /// Returns the value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The producing application, if the record names one.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.get(RESERVED_KEY)
    }

    /// Candidate entries: trimmed, non-empty values of every non-reserved key.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(key, _)| key.as_str() != RESERVED_KEY)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
