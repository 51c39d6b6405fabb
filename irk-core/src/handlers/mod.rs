//! Handler matching protocol.
//!
//! A handler classifies one raw line and, on a match, invokes its
//! plugin-supplied callback. The set of handler kinds is closed: one
//! struct per kind, collected under the [`Handler`] enum, with the
//! cross-cutting PRIVMSG policy (blacklist, bridge-bot rewriting,
//! cooldown, scope filtering) shared as free functions in [`policy`].
//!
//! Callbacks return a [`Flow`] so a handler can deregister itself after
//! firing without any mutable-flag races: the dispatch queue acts on
//! the returned value atomically.

pub mod policy;

mod all;
mod bus_events;
mod ctcp;
mod lifecycle;
mod membership;
mod message;
mod ping_pong;

pub use all::{AllArgs, AllCallback, AllHandler};
pub use bus_events::{BusEventArgs, BusEventCallback, BusEventHandler};
pub use ctcp::{ActionHandler, CtcpPingHandler};
pub use lifecycle::{CoreEventArgs, CoreEventCallback, CoreEventHandler};
pub use membership::{
    JoinArgs, JoinCallback, JoinHandler, KickArgs, KickCallback, KickHandler, PartArgs,
    PartCallback, PartHandler,
};
pub use message::{MessageArgs, MessageCallback, MessageHandler, MessageHandlerConfig};
pub use ping_pong::{PingArgs, PingCallback, PingHandler, PongArgs, PongCallback, PongHandler};

use std::sync::Arc;

use crate::config::BotConfig;
use crate::writer::IrcWriter;

/// What the dispatch queue should do with a handler after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Continue,
    /// Remove this handler from its plugin's list.
    Deregister,
}

/// Per-dispatch envelope handed to every handler.
///
/// Cloned once per plugin before invocation because the blacklist
/// differs per plugin; everything else is shared.
#[derive(Clone)]
pub struct HandlerArgs {
    pub line: String,
    pub config: Arc<BotConfig>,
    pub writer: IrcWriter,
    /// Channels this plugin must ignore.
    pub blacklist: Vec<String>,
}

impl HandlerArgs {
    /// Clone with a different blacklist (the per-plugin copy).
    pub fn with_blacklist(&self, blacklist: Vec<String>) -> Self {
        Self {
            line: self.line.clone(),
            config: self.config.clone(),
            writer: self.writer.clone(),
            blacklist,
        }
    }
}

/// The closed set of handler kinds.
pub enum Handler {
    Message(MessageHandler),
    Action(ActionHandler),
    CtcpPing(CtcpPingHandler),
    Join(JoinHandler),
    Part(PartHandler),
    Kick(KickHandler),
    Ping(PingHandler),
    Pong(PongHandler),
    All(AllHandler),
    CoreEvent(CoreEventHandler),
    Bus(BusEventHandler),
}

impl Handler {
    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Message(_) => "message",
            Handler::Action(_) => "action",
            Handler::CtcpPing(_) => "ctcp-ping",
            Handler::Join(_) => "join",
            Handler::Part(_) => "part",
            Handler::Kick(_) => "kick",
            Handler::Ping(_) => "ping",
            Handler::Pong(_) => "pong",
            Handler::All(_) => "all",
            Handler::CoreEvent(_) => "core-event",
            Handler::Bus(_) => "bus-event",
        }
    }

    /// Test the line against this handler and fire the callback on a
    /// match. Side effects only; errors belong to the callback.
    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        match self {
            Handler::Message(h) => h.handle(args),
            Handler::Action(h) => h.handle(args),
            Handler::CtcpPing(h) => h.handle(args),
            Handler::Join(h) => h.handle(args),
            Handler::Part(h) => h.handle(args),
            Handler::Kick(h) => h.handle(args),
            Handler::Ping(h) => h.handle(args),
            Handler::Pong(h) => h.handle(args),
            Handler::All(h) => h.handle(args),
            Handler::CoreEvent(h) => h.handle(args),
            Handler::Bus(h) => h.handle(args),
        }
    }
}

macro_rules! impl_from_handler {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(impl From<$ty> for Handler {
            fn from(h: $ty) -> Self {
                Handler::$variant(h)
            }
        })+
    };
}

impl_from_handler! {
    Message => MessageHandler,
    Action => ActionHandler,
    CtcpPing => CtcpPingHandler,
    Join => JoinHandler,
    Part => PartHandler,
    Kick => KickHandler,
    Ping => PingHandler,
    Pong => PongHandler,
    All => AllHandler,
    CoreEvent => CoreEventHandler,
    Bus => BusEventHandler,
}
