//! Catch-all raw-line handler. Sees every dispatched line, including
//! event envelopes; no policy applies.

use crate::handlers::{Flow, HandlerArgs};
use crate::writer::IrcWriter;

pub struct AllArgs {
    pub writer: IrcWriter,
    pub line: String,
}

pub type AllCallback = Box<dyn FnMut(&AllArgs) -> anyhow::Result<Flow> + Send>;

pub struct AllHandler {
    callback: AllCallback,
}

impl AllHandler {
    pub fn new(callback: AllCallback) -> Self {
        Self { callback }
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        (self.callback)(&AllArgs {
            writer: args.writer.clone(),
            line: args.line.clone(),
        })
    }
}
