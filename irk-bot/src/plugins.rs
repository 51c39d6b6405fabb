//! Built-in plugins.
//!
//! Deliberately small: enough to prove the registry end to end. Real
//! deployments register their own [`Plugin`] lists.

use std::time::Duration;

use anyhow::Result;
use irk_core::handlers::{JoinHandler, MessageHandler, MessageHandlerConfig};
use irk_core::{Flow, Plugin};

pub fn default_plugins() -> Result<Vec<Plugin>> {
    Ok(vec![hello_plugin()?])
}

/// Greets on `!hello` and welcomes users joining a channel.
fn hello_plugin() -> Result<Plugin> {
    let mut hello_config = MessageHandlerConfig::new(
        r"^!hello\b",
        Box::new(|args| {
            args.writer
                .send_message(&format!("Hello, {}!", args.user), &args.channel);
            Ok(Flow::Continue)
        }),
    );
    // Don't let a busy channel turn the bot into a parrot.
    hello_config.cooldown = Duration::from_secs(15);
    let hello = MessageHandler::new(hello_config)?;

    let greet = JoinHandler::new(Box::new(|args| {
        args.writer
            .send_message(&format!("Welcome to {}, {}.", args.channel, args.user), &args.channel);
        Ok(Flow::Continue)
    }));

    Ok(Plugin::new("hello", vec![hello.into(), greet.into()]))
}
