//! Shared constructors for unit tests.

use std::sync::Arc;

use crate::config::BotConfig;
use crate::core_events::EventSink;
use crate::handlers::HandlerArgs;
use crate::writer::{SharedTransport, WriterQueue};

pub(crate) fn test_config() -> BotConfig {
    BotConfig {
        server: "irc.example.net".to_string(),
        nick: "irkbot".to_string(),
        channels: vec!["#chan".to_string()],
        rate_limit_ms: 0,
        ..BotConfig::default()
    }
}

/// HandlerArgs backed by a writer whose queue is never started: sends
/// enqueue silently, which is all a matching test needs.
pub(crate) fn test_args(config: BotConfig, blacklist: Vec<String>) -> HandlerArgs {
    let config = Arc::new(config);
    let queue = WriterQueue::new();
    let transport: SharedTransport = Arc::new(tokio::sync::Mutex::new(None));
    let writer = queue.writer(transport, config.clone(), EventSink::new());
    HandlerArgs {
        line: String::new(),
        config,
        writer,
        blacklist,
    }
}

pub(crate) fn args_for_line(line: &str) -> HandlerArgs {
    let mut args = test_args(test_config(), Vec::new());
    args.line = line.to_string();
    args
}
