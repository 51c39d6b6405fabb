//! Synthetic lifecycle events emitted by the runtime itself.
//!
//! The connection announces its own state changes (connected, finished
//! joining, watchdog failure, ...) and audits every outbound send by
//! injecting envelope lines into the dispatch queue, so plugins can
//! observe the runtime with ordinary handlers. Core events reuse the bus
//! envelope with the reserved [`CORE_SOURCE`](crate::bus::CORE_SOURCE)
//! and carry their event name in the `event` arg.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::{BusEvent, CORE_SOURCE};

/// Arg key holding the core event's name.
pub const EVENT_ARG: &str = "event";

/// Core event names.
pub mod names {
    pub const CONNECTED: &str = "connected";
    pub const FINISHED_JOINING: &str = "finished-joining";
    pub const DISCONNECTING: &str = "disconnecting";
    pub const DISCONNECTED: &str = "disconnected";
    pub const RECONNECTING: &str = "reconnecting";
    pub const WATCHDOG_FAILED: &str = "watchdog-failed";

    pub const SEND_MESSAGE: &str = "send-message";
    pub const SEND_ACTION: &str = "send-action";
    pub const SEND_NOTICE: &str = "send-notice";
    pub const SEND_JOIN: &str = "send-join";
    pub const SEND_PART: &str = "send-part";
    pub const SEND_KICK: &str = "send-kick";
    pub const SEND_RAW: &str = "send-raw";
}

/// Build a core event envelope line.
pub fn core_event(event: &str, args: &[(&str, &str)]) -> String {
    let mut map: BTreeMap<String, String> = args
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.insert(EVENT_ARG.to_string(), event.to_string());
    BusEvent {
        source: CORE_SOURCE.to_string(),
        dest: String::new(),
        args: map,
        passthrough: BTreeMap::new(),
    }
    .serialize()
}

/// Late-bound injector of envelope lines into the dispatch queue.
///
/// The writer and the bus need to emit events, but the dispatch queue is
/// built after them; the sink is the seam that breaks that cycle. Emits
/// before `bind` are dropped (nothing is listening yet).
#[derive(Clone, Default)]
pub struct EventSink {
    inner: Arc<Mutex<Option<Box<dyn Fn(String) + Send + Sync>>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, f: impl Fn(String) + Send + Sync + 'static) {
        *self.inner.lock() = Some(Box::new(f));
    }

    pub fn emit(&self, line: String) {
        if let Some(f) = &*self.inner.lock() {
            f(line);
        }
    }
}
