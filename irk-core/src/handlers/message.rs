//! Plain PRIVMSG handler.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::RegexBuilder;

use crate::error::ConfigError;
use crate::handlers::policy::{self, PrivmsgPolicy, ResponseScope};
use crate::handlers::{Flow, HandlerArgs};
use crate::writer::IrcWriter;

/// What a matched message handler's callback receives.
pub struct MessageArgs {
    pub writer: IrcWriter,
    /// Sender nick after bridge-bot rewriting.
    pub user: String,
    /// Reply target: the channel, or the sender for private messages.
    pub channel: String,
    /// Message body after bridge-bot rewriting.
    pub message: String,
}

pub type MessageCallback = Box<dyn FnMut(&MessageArgs) -> anyhow::Result<Flow> + Send>;

/// Construction parameters for [`MessageHandler`].
pub struct MessageHandlerConfig {
    /// Regex tested against the message body; may contain the
    /// `{%user%}`, `{%nick%}`, `{%channel%}` placeholders.
    pub line_regex: String,
    pub case_insensitive: bool,
    pub cooldown: Duration,
    pub scope: ResponseScope,
    pub respond_to_self: bool,
    pub callback: MessageCallback,
}

impl MessageHandlerConfig {
    /// Sensible defaults: case-insensitive, no cooldown, channels and
    /// PMs, self-messages suppressed.
    pub fn new(line_regex: impl Into<String>, callback: MessageCallback) -> Self {
        Self {
            line_regex: line_regex.into(),
            case_insensitive: true,
            cooldown: Duration::ZERO,
            scope: ResponseScope::default(),
            respond_to_self: false,
            callback,
        }
    }
}

/// Fires on ordinary channel/private messages matching a regex.
///
/// Defers to the CTCP subtypes: a body owned by ACTION or CTCP-PING
/// framing never fires this handler, no matter what the regex says.
pub struct MessageHandler {
    line_regex: String,
    case_insensitive: bool,
    cooldown: Duration,
    scope: ResponseScope,
    respond_to_self: bool,
    callback: MessageCallback,
    cooldowns: HashMap<String, Instant>,
}

impl MessageHandler {
    pub fn new(config: MessageHandlerConfig) -> Result<Self, ConfigError> {
        validate_line_regex(&config.line_regex)?;
        Ok(Self {
            line_regex: config.line_regex,
            case_insensitive: config.case_insensitive,
            cooldown: config.cooldown,
            scope: config.scope,
            respond_to_self: config.respond_to_self,
            callback: config.callback,
            cooldowns: HashMap::new(),
        })
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(msg) = policy::parse_privmsg(&args.line) else {
            return Ok(Flow::Continue);
        };
        if policy::is_ctcp_subtype(&msg.message) {
            return Ok(Flow::Continue);
        }
        let privmsg_policy = PrivmsgPolicy {
            line_regex: &self.line_regex,
            case_insensitive: self.case_insensitive,
            scope: self.scope,
            respond_to_self: self.respond_to_self,
            cooldown: self.cooldown,
        };
        let Some(resolved) = policy::evaluate(
            &msg.nick,
            &msg.channel,
            &msg.message,
            args,
            &privmsg_policy,
            &mut self.cooldowns,
        ) else {
            return Ok(Flow::Continue);
        };
        (self.callback)(&MessageArgs {
            writer: args.writer.clone(),
            user: resolved.user,
            channel: resolved.channel,
            message: resolved.message,
        })
    }
}

/// Reject empty patterns and anything that cannot compile once the
/// placeholders are substituted.
pub(crate) fn validate_line_regex(line_regex: &str) -> Result<(), ConfigError> {
    let mut violations = Vec::new();
    if line_regex.trim().is_empty() {
        violations.push("line regex must not be empty".to_string());
    } else {
        let probe = policy::liquefy(line_regex, "user", "nick", "#channel");
        if let Err(e) = RegexBuilder::new(&probe).build() {
            violations.push(format!("line regex {line_regex:?} does not compile: {e}"));
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError { violations })
    }
}
