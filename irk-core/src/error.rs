//! Error taxonomy for the runtime.
//!
//! Three families matter here: configuration faults (found before any
//! connection attempt, reported all at once), state errors (the caller
//! drove the connection state machine wrong), and transport faults
//! (plain `std::io::Error`, recovered by the watchdog/reconnect path).
//! Plugin handler faults never surface as `Err` from the engine; they
//! are wrapped as [`HandlerFault`] and routed to the dispatch queue's
//! error hook.

use thiserror::Error;

/// Aggregated configuration validation failure.
///
/// `violations` lists every problem found, not just the first, so a bad
/// config file can be fixed in one pass.
#[derive(Debug, Error)]
#[error("invalid configuration:\n{}", .violations.join("\n"))]
pub struct ConfigError {
    pub violations: Vec<String>,
}

/// The connection state machine was driven out of order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("connect() called before init()")]
    NotInitialized,
    #[error("already connected")]
    AlreadyConnected,
    #[error("connection has been disposed")]
    Disposed,
    #[error("timed out waiting for channel joins to drain")]
    JoinTimeout,
}

/// Anything `Connection` can fail with.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("transport fault: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A plugin handler returned an error during dispatch.
///
/// Carries enough context to attribute the failure: the owning plugin,
/// the handler kind, and the raw line that triggered the invocation.
#[derive(Debug, Error)]
#[error("handler fault in plugin '{plugin}' ({handler_kind}) on line {line:?}")]
pub struct HandlerFault {
    pub plugin: String,
    pub handler_kind: &'static str,
    pub line: String,
    #[source]
    pub source: anyhow::Error,
}
