//! Pipeline field contract.
//!
//! The host pipeline owns the event model; filters only need to get and set
//! named fields and to report which events they inspected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A pipeline event with named fields.
pub trait Event {
    /// Returns the value of `name`, if present.
    fn get_field(&self, name: &str) -> Option<&Value>;

    /// Sets `name` to `value`, replacing any previous value.
    fn set_field(&mut self, name: &str, value: Value);

    /// Returns the value of `name` if it is a string.
    fn get_str(&self, name: &str) -> Option<&str> {
        self.get_field(name).and_then(Value::as_str)
    }
}

/// Receives a callback for every event a filter acted on.
pub trait MatchListener {
    /// Called once per event the filter inspected.
    fn filter_matched(&self, event: &dyn Event);
}

/// A pipeline filter over a batch of events.
pub trait Filter {
    /// Plugin instance identifier.
    fn id(&self) -> &str;

    /// Processes `events` in place, notifying `listener` per inspected event.
    fn filter<E: Event>(&self, events: &mut [E], listener: &dyn MatchListener);
}

/// Event backed by a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonEvent(pub Map<String, Value>);

impl JsonEvent {
    /// Creates an empty event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object.
    ///
    /// # Errors
    ///
    /// Fails if `line` is not valid JSON or not an object.
    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Serializes back to a single JSON line.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_owned(), value.into());
        self
    }
}

impl Event for JsonEvent {
    fn get_field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn set_field(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_owned(), value);
    }
}

/// Listener that ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl MatchListener for NoopListener {
    fn filter_matched(&self, _event: &dyn Event) {}
}

/// Listener that counts notifications.
#[derive(Debug, Default)]
pub struct CountingListener {
    matched: AtomicUsize,
}

impl CountingListener {
    /// Creates a listener with a zero count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications received.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.matched.load(Ordering::Relaxed)
    }
}

impl MatchListener for CountingListener {
    fn filter_matched(&self, _event: &dyn Event) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }
}
