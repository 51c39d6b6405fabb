//! Subscription handler for the inter-plugin event bus.

use crate::bus::{BusEvent, CORE_SOURCE};
use crate::handlers::{Flow, HandlerArgs};
use crate::writer::IrcWriter;

pub struct BusEventArgs {
    pub writer: IrcWriter,
    pub event: BusEvent,
}

pub type BusEventCallback = Box<dyn FnMut(&BusEventArgs) -> anyhow::Result<Flow> + Send>;

/// Delivers bus events addressed to one plugin.
///
/// Targeted events are delivered when `dest` names the owning plugin
/// (optionally narrowed by an expected source). Broadcast events are
/// delivered only to subscriptions that name their expected source:
/// a subscription with no source filter never receives broadcasts, so
/// a plugin cannot loop on its own broadcast or receive an ambiguous
/// merge of several senders.
pub struct BusEventHandler {
    plugin: String,
    expected_source: Option<String>,
    callback: BusEventCallback,
}

impl BusEventHandler {
    pub fn new(plugin: impl Into<String>, callback: BusEventCallback) -> Self {
        Self {
            plugin: plugin.into(),
            expected_source: None,
            callback,
        }
    }

    /// Narrow the subscription to one sending plugin. Required for
    /// broadcast delivery.
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.expected_source = Some(source.into());
        self
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(event) = BusEvent::parse(&args.line) else {
            return Ok(Flow::Continue);
        };
        if event.source == CORE_SOURCE {
            return Ok(Flow::Continue);
        }
        if !event.is_broadcast() && !event.dest.eq_ignore_ascii_case(&self.plugin) {
            return Ok(Flow::Continue);
        }
        match &self.expected_source {
            Some(source) => {
                if !event.source.eq_ignore_ascii_case(source) {
                    return Ok(Flow::Continue);
                }
            }
            None => {
                if event.is_broadcast() {
                    return Ok(Flow::Continue);
                }
            }
        }
        (self.callback)(&BusEventArgs {
            writer: args.writer.clone(),
            event,
        })
    }
}
