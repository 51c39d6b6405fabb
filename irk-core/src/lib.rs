//! Connection and dispatch engine for the irk IRC bot runtime.
//!
//! One [`Connection`](connection::Connection) owns a single IRC server
//! connection: a reader task, a serialized writer queue with flood
//! protection, a PING/PONG watchdog, and a reconnect state machine.
//! Every line read is fanned out through the ordered dispatch queue to
//! plugin-registered [`handlers`], which classify lines with regexes
//! and apply the shared response policy (blacklists, cooldowns,
//! bridge-bot rewriting, scope filtering). Plugins write back through
//! the [`IrcWriter`](writer::IrcWriter) contract and talk to each other
//! over the typed [`bus`].

pub mod action_channel;
pub mod bus;
pub mod config;
pub mod connection;
pub mod core_events;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod scheduler;
pub mod transport;
pub mod watchdog;
pub mod writer;

#[cfg(test)]
pub(crate) mod testutil;

pub use bus::{BusEvent, BusFactory, PluginBusSender};
pub use config::{BotConfig, BridgeBotConfig};
pub use connection::{Connection, ConnectionState};
pub use dispatch::Plugin;
pub use error::{ConfigError, ConnectionError, HandlerFault, StateError};
pub use handlers::{Flow, Handler};
pub use scheduler::EventId;
pub use writer::IrcWriter;
