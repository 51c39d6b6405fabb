//! Handlers for the runtime's own lifecycle events.
//!
//! The connection injects envelope lines (source
//! [`CORE_SOURCE`](crate::bus::CORE_SOURCE)) for state changes and
//! outbound audit; this handler matches them by event name.

use crate::bus::{BusEvent, CORE_SOURCE};
use crate::core_events::{EVENT_ARG, names};
use crate::handlers::{Flow, HandlerArgs};
use crate::writer::IrcWriter;

pub struct CoreEventArgs {
    pub writer: IrcWriter,
    /// The full envelope; `args` carries the event's fields.
    pub event: BusEvent,
}

pub type CoreEventCallback = Box<dyn FnMut(&CoreEventArgs) -> anyhow::Result<Flow> + Send>;

pub struct CoreEventHandler {
    event: String,
    callback: CoreEventCallback,
}

impl CoreEventHandler {
    pub fn new(event: impl Into<String>, callback: CoreEventCallback) -> Self {
        Self {
            event: event.into(),
            callback,
        }
    }

    /// Fires once per (re)connect, before channels are joined.
    pub fn connected(callback: CoreEventCallback) -> Self {
        Self::new(names::CONNECTED, callback)
    }

    /// Fires after every configured channel's JOIN has drained.
    pub fn finished_joining(callback: CoreEventCallback) -> Self {
        Self::new(names::FINISHED_JOINING, callback)
    }

    pub fn disconnected(callback: CoreEventCallback) -> Self {
        Self::new(names::DISCONNECTED, callback)
    }

    pub fn watchdog_failed(callback: CoreEventCallback) -> Self {
        Self::new(names::WATCHDOG_FAILED, callback)
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(event) = BusEvent::parse(&args.line) else {
            return Ok(Flow::Continue);
        };
        if event.source != CORE_SOURCE {
            return Ok(Flow::Continue);
        }
        if event.args.get(EVENT_ARG).map(String::as_str) != Some(self.event.as_str()) {
            return Ok(Flow::Continue);
        }
        (self.callback)(&CoreEventArgs {
            writer: args.writer.clone(),
            event,
        })
    }
}
