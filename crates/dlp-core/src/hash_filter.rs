//! Whole-field hashing filter.
//!
//! Replaces a string field with its digest. Upstream pipelines use it to
//! publish sensitive values to the denylist topic without the plaintext
//! ever leaving the pipeline.

use crate::config::HashFilterConfig;
use crate::event::{Event, Filter, MatchListener};
use serde_json::Value;

/// Replaces `source_field` with its hex digest.
#[derive(Debug, Clone)]
pub struct HashFilter {
    config: HashFilterConfig,
}

impl HashFilter {
    /// Creates the filter.
    #[must_use]
    pub fn new(config: HashFilterConfig) -> Self {
        Self { config }
    }
}

impl Filter for HashFilter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn filter<E: Event>(&self, events: &mut [E], listener: &dyn MatchListener) {
        for event in events.iter_mut() {
            let Some(value) = event.get_str(&self.config.source_field) else {
                continue;
            };
            let digest = self.config.hashing_algorithm.digest(value);
            event.set_field(&self.config.source_field, Value::String(digest));
            listener.filter_matched(&*event);
        }
    }
}
