// Copyright 2024 fspipe contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The process-wide event bus: every stage emits structured lifecycle and I/O
//! events here, and registered [`EventSink`]s receive the ones whose component is
//! allow-listed.
//!
//! Mirrors the allow-map + child-sink-list shape of a classic fan-out logger: a
//! `parking_lot::RwLock` guards both the sink list and the allow-map, writers take
//! the write lock, `send` takes the read lock and forwards synchronously.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The stage kind that produced an [`Event`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    File,
    Source,
    Filter,
}

impl Component {
    fn as_str(&self) -> &'static str {
        match self {
            Component::File => "file",
            Component::Source => "source",
            Component::Filter => "filter",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The lifecycle or I/O moment an [`Event`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Created,
    Started,
    ResultProduced,
    Finished,
    Cancelled,
    Destroyed,
    Opened,
    Read,
    Closed,
}

/// `{component, type, data}`, where `data` always carries at least an `id` key.
///
/// Serializes to and deserializes from the compact object form fixed by the
/// external-interfaces section of the design; unknown keys round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub component: Component,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: HashMap<String, Value>,
}

impl Event {
    /// Builds the minimal event for `component`/`event_type`, carrying only `id`.
    pub fn new(component: Component, event_type: EventType, id: impl Into<String>) -> Self {
        let mut data = HashMap::new();
        data.insert("id".to_string(), Value::String(id.into()));
        Event {
            component,
            event_type,
            data,
        }
    }

    /// Adds (or overwrites) a `data` key, returning `self` for chaining.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }

    /// Serializes to the compact wire object: `{"component":...,"type":...,"data":{...}}`.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Parses an event previously produced by [`Event::to_json`].
    pub fn from_json(value: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}

/// Receives [`Event`]s forwarded by the process-wide bus.
///
/// Sinks are invoked synchronously on the sending task and therefore must not
/// block; a sink that wants to do expensive work should hand events off to its
/// own background task.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &Event);
}

struct Bus {
    sinks: Vec<Arc<dyn EventSink>>,
    allowed: HashMap<Component, bool>,
}

static BUS: LazyLock<RwLock<Bus>> = LazyLock::new(|| {
    RwLock::new(Bus {
        sinks: Vec::new(),
        allowed: HashMap::new(),
    })
});

/// Appends `sink` to the process-wide bus.
pub fn register_event_sink(sink: Arc<dyn EventSink>) {
    BUS.write().sinks.push(sink);
}

/// Toggles delivery of events from `component` to registered sinks.
pub fn allow_events_from(component: Component, allowed: bool) {
    BUS.write().allowed.insert(component, allowed);
}

/// Returns whether events from `component` are currently allowed.
pub fn is_allowed_from(component: Component) -> bool {
    BUS.read().allowed.get(&component).copied().unwrap_or(false)
}

/// Forwards `event` to every registered sink, if its component is allowed.
///
/// A no-op (and cheap: a single read-lock acquisition) if nothing is allowed or
/// registered yet, so stages can call this unconditionally.
pub fn send_event(event: Event) {
    let bus = BUS.read();
    if !bus.allowed.get(&event.component).copied().unwrap_or(false) {
        return;
    }
    for sink in &bus.sinks {
        sink.send(&event);
    }
}

/// Test-only: clears every registered sink and allow-map entry.
///
/// The global bus is process-wide state; tests that assert on specific event
/// sequences must reset it first to avoid bleeding into other tests.
#[cfg(any(test, feature = "test-util"))]
pub fn reset_for_tests() {
    let mut bus = BUS.write();
    bus.sinks.clear();
    bus.allowed.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The event bus is process-wide, so tests that touch it serialize on this lock
    // rather than relying on `cargo test`'s default parallelism.
    static EVENT_BUS_TEST_LOCK: Mutex<()> = Mutex::new(());

    struct RecordingSink {
        events: parking_lot::Mutex<Vec<Event>>,
    }

    impl EventSink for RecordingSink {
        fn send(&self, event: &Event) {
            self.events.lock().push(event.clone());
        }
    }

    #[test]
    fn undelivered_component_is_dropped() {
        let _guard = EVENT_BUS_TEST_LOCK.lock().unwrap();
        reset_for_tests();

        let sink = Arc::new(RecordingSink {
            events: parking_lot::Mutex::new(Vec::new()),
        });
        register_event_sink(sink.clone());

        send_event(Event::new(Component::Source, EventType::Created, "src"));
        assert!(sink.events.lock().is_empty());

        allow_events_from(Component::Source, true);
        send_event(Event::new(Component::Source, EventType::Created, "src"));
        assert_eq!(sink.events.lock().len(), 1);

        allow_events_from(Component::Source, false);
        send_event(Event::new(Component::Source, EventType::Created, "src"));
        assert_eq!(sink.events.lock().len(), 1);
    }

    #[test]
    fn json_round_trip_preserves_every_field() {
        let event = Event::new(Component::File, EventType::Opened, "src.file")
            .with_field("file", "a/b.txt")
            .with_field("length", 42);

        let json = event.to_json().unwrap();
        let parsed = Event::from_json(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn wire_shape_matches_component_type_data() {
        let event = Event::new(Component::Filter, EventType::ResultProduced, "f1");
        let json = event.to_json().unwrap();
        assert_eq!(json["component"], "filter");
        assert_eq!(json["type"], "resultProduced");
        assert_eq!(json["data"]["id"], "f1");
    }
}
