//! Inter-plugin event bus.
//!
//! Plugins talk to each other through [`BusEvent`]s: a source plugin, an
//! optional destination (empty means broadcast), a map of required args,
//! and a map of pass-through args a responder echoes back verbatim.
//! Events travel through the same dispatch queue as IRC traffic, framed
//! as a single line with a stable prefix so the handler matchers can
//! tell them apart from server lines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core_events::EventSink;

/// Line prefix marking an event envelope. Versioned so a framing change
/// can never be confused with the old format.
pub const ENVELOPE_PREFIX: &str = "IRKEVENT1 ";

/// Reserved source for events emitted by the runtime itself.
pub const CORE_SOURCE: &str = "irk.core";

/// One event on the bus.
///
/// `dest` empty means broadcast. Args maps are ordered so that
/// serialization is deterministic and `parse(serialize(e)) == e`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    pub source: String,
    #[serde(default)]
    pub dest: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    #[serde(default)]
    pub passthrough: BTreeMap<String, String>,
}

impl BusEvent {
    pub fn is_broadcast(&self) -> bool {
        self.dest.is_empty()
    }

    /// Attach pass-through args: ignored for matching, echoed back by
    /// a responding plugin.
    pub fn with_passthrough(mut self, passthrough: BTreeMap<String, String>) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// Render as a single dispatchable line. JSON string escaping
    /// guarantees no raw newlines survive into the envelope.
    pub fn serialize(&self) -> String {
        // BTreeMap<String, String> cannot fail to serialize.
        let json = serde_json::to_string(self).expect("bus event serialization");
        format!("{ENVELOPE_PREFIX}{json}")
    }

    /// Parse an envelope line. `None` for ordinary IRC traffic or a
    /// malformed envelope.
    pub fn parse(line: &str) -> Option<Self> {
        let json = line.strip_prefix(ENVELOPE_PREFIX)?;
        serde_json::from_str(json).ok()
    }
}

/// Constructed once at startup and handed to each plugin's init; there
/// is no global factory state. Each plugin gets its own sender stamped
/// with the plugin's name as the event source.
#[derive(Clone)]
pub struct BusFactory {
    sink: EventSink,
}

impl BusFactory {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn for_plugin(&self, plugin: &str) -> PluginBusSender {
        PluginBusSender {
            plugin: plugin.to_string(),
            sink: self.sink.clone(),
        }
    }
}

/// A plugin's handle for creating and sending bus events.
#[derive(Clone)]
pub struct PluginBusSender {
    plugin: String,
    sink: EventSink,
}

impl PluginBusSender {
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Create an event visible to every plugin subscribed to this source.
    pub fn broadcast(&self, args: BTreeMap<String, String>) -> BusEvent {
        BusEvent {
            source: self.plugin.clone(),
            dest: String::new(),
            args,
            passthrough: BTreeMap::new(),
        }
    }

    /// Create an event addressed to one plugin.
    pub fn targeted(&self, dest: &str, args: BTreeMap<String, String>) -> BusEvent {
        BusEvent {
            source: self.plugin.clone(),
            dest: dest.to_string(),
            args,
            passthrough: BTreeMap::new(),
        }
    }

    /// Build a response to a received event: targeted back at its
    /// source, with the pass-through args echoed verbatim.
    pub fn reply(&self, received: &BusEvent, args: BTreeMap<String, String>) -> BusEvent {
        BusEvent {
            source: self.plugin.clone(),
            dest: received.source.clone(),
            args,
            passthrough: received.passthrough.clone(),
        }
    }

    /// Inject the event into the dispatch queue.
    pub fn send(&self, event: &BusEvent) {
        self.sink.emit(event.serialize());
    }
}
