//! The DLP masking filter.
//!
//! [`DlpProcessor`] ties the pieces together for each event:
//!
//! ```text
//! event[source_field] ─▶ tokens ─▶ digest ─▶ ReferentialCache::lookup(code)
//!                                              │ member?
//!                                              ▼
//!                         event[source_field] ◀─ mask / keep, rejoin
//! ```
//!
//! The application code comes from the event itself, so one filter instance
//! serves any number of applications.

use crate::cache::{LoadStatus, ReferentialCache};
use crate::config::{LoadFailurePolicy, ProcessorConfig};
use crate::event::{Event, Filter, MatchListener};
use crate::tokenize::{redact, redact_all, Redaction};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Masks denylisted tokens in one field of each event.
///
/// # Failure Handling
///
/// Events are never dropped and processing never errors:
///
/// | Condition | Result |
/// |-----------|--------|
/// | Source field missing or not a string | Passed through, no notification |
/// | No application code | Passed through, no notification |
/// | Referential unavailable, fail-open | Field unchanged, notification fires |
/// | Referential unavailable, fail-closed | Every token masked, notification fires |
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dlp_core::{CountingListener, DlpProcessor, Filter, JsonEvent, ProcessorConfig, ReferentialCache};
///
/// let config = ProcessorConfig::default();
/// let cache = Arc::new(ReferentialCache::new(config.hash_path.clone()));
/// let processor = DlpProcessor::new(config, cache);
///
/// let mut events = vec![JsonEvent::new().with("elk", "app1").with("message", "the secret code")];
/// let listener = CountingListener::new();
/// processor.filter(&mut events, &listener);
/// ```
#[derive(Debug, Clone)]
pub struct DlpProcessor {
    config: ProcessorConfig,
    cache: Arc<ReferentialCache>,
}

impl DlpProcessor {
    /// Creates a processor sharing `cache` with other workers.
    ///
    /// Referentials are read from the cache's own `hash_path`; a different
    /// `config.hash_path` is ignored with a warning.
    #[must_use]
    pub fn new(config: ProcessorConfig, cache: Arc<ReferentialCache>) -> Self {
        if cache.hash_path() != config.hash_path {
            warn!(
                "Processor '{}' configured with hash_path {} but its cache reads {}; using {}",
                config.id,
                config.hash_path,
                cache.hash_path(),
                cache.hash_path()
            );
        }
        Self { config, cache }
    }

    /// Creates a processor with its own cache rooted at `config.hash_path`.
    #[must_use]
    pub fn with_own_cache(config: ProcessorConfig) -> Self {
        let cache = Arc::new(ReferentialCache::new(config.hash_path.clone()));
        Self::new(config, cache)
    }

    /// The processor configuration.
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The shared referential cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ReferentialCache> {
        &self.cache
    }

    /// Redacts one field value against the denylist of `application_code`.
    #[must_use]
    pub fn redact(&self, value: &str, application_code: &str) -> Redaction {
        let referential = self.cache.lookup(application_code);
        let placeholder = self.config.placeholder;

        match (referential.status(), self.config.on_load_failure) {
            (LoadStatus::Unavailable, LoadFailurePolicy::FailClosed) => {
                debug!(
                    "Referential for '{}' unavailable, masking whole field",
                    application_code
                );
                redact_all(value, placeholder)
            }
            _ => redact(
                value,
                &referential,
                self.config.hashing_algorithm,
                placeholder,
            ),
        }
    }

    fn application_code<'e, E: Event>(&'e self, event: &'e E) -> Option<&'e str> {
        event
            .get_str(&self.config.application_code_field)
            .or(self.config.default_application_code.as_deref())
    }
}

impl Filter for DlpProcessor {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn filter<E: Event>(&self, events: &mut [E], listener: &dyn MatchListener) {
        for event in events.iter_mut() {
            let Some(value) = event.get_str(&self.config.source_field) else {
                continue;
            };

            let Some(code) = self.application_code(&*event) else {
                warn!(
                    "Event has no '{}' field and no default application code, left unmasked",
                    self.config.application_code_field
                );
                continue;
            };

            let redaction = self.redact(value, code);
            if redaction.masked > 0 {
                debug!("Masked {} token(s) for '{}'", redaction.masked, code);
            }

            event.set_field(&self.config.source_field, Value::String(redaction.text));
            listener.filter_matched(&*event);
        }
    }
}
