//! CTCP-framed PRIVMSG subtypes: ACTION ("/me") and CTCP PING.
//!
//! Both run the same policy pipeline as plain messages; the handler's
//! regex applies to the unwrapped CTCP payload.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::ConfigError;
use crate::handlers::message::{MessageArgs, MessageCallback, validate_line_regex};
use crate::handlers::policy::{self, PrivmsgPolicy, ResponseScope};
use crate::handlers::{Flow, HandlerArgs};

/// Fires on `/me`-style CTCP ACTION messages.
pub struct ActionHandler {
    line_regex: String,
    case_insensitive: bool,
    cooldown: Duration,
    scope: ResponseScope,
    respond_to_self: bool,
    callback: MessageCallback,
    cooldowns: HashMap<String, Instant>,
}

impl ActionHandler {
    pub fn new(line_regex: impl Into<String>, callback: MessageCallback) -> Result<Self, ConfigError> {
        let line_regex = line_regex.into();
        validate_line_regex(&line_regex)?;
        Ok(Self {
            line_regex,
            case_insensitive: true,
            cooldown: Duration::ZERO,
            scope: ResponseScope::default(),
            respond_to_self: false,
            callback,
            cooldowns: HashMap::new(),
        })
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_scope(mut self, scope: ResponseScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some((channel, nick, body)) = ctcp_payload(args, "ACTION") else {
            return Ok(Flow::Continue);
        };
        let privmsg_policy = PrivmsgPolicy {
            line_regex: &self.line_regex,
            case_insensitive: self.case_insensitive,
            scope: self.scope,
            respond_to_self: self.respond_to_self,
            cooldown: self.cooldown,
        };
        let Some(resolved) = policy::evaluate(
            &nick,
            &channel,
            &body,
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

/// Fires on CTCP PING requests. The conventional reply is
/// [`IrcWriter::send_ctcp_pong`](crate::writer::IrcWriter::send_ctcp_pong)
/// echoing the payload, but the callback owns that decision.
pub struct CtcpPingHandler {
    line_regex: String,
    cooldown: Duration,
    scope: ResponseScope,
    respond_to_self: bool,
    callback: MessageCallback,
    cooldowns: HashMap<String, Instant>,
}

impl CtcpPingHandler {
    pub fn new(callback: MessageCallback) -> Self {
        // Match any payload by default; CTCP PING is a protocol probe,
        // not a command surface.
        Self {
            line_regex: ".*".to_string(),
            cooldown: Duration::ZERO,
            scope: ResponseScope::ChannelAndPms,
            respond_to_self: false,
            callback,
            cooldowns: HashMap::new(),
        }
    }

    pub fn with_line_regex(mut self, line_regex: impl Into<String>) -> Result<Self, ConfigError> {
        self.line_regex = line_regex.into();
        validate_line_regex(&self.line_regex)?;
        Ok(self)
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some((channel, nick, body)) = ctcp_payload(args, "PING") else {
            return Ok(Flow::Continue);
        };
        let privmsg_policy = PrivmsgPolicy {
            line_regex: &self.line_regex,
            case_insensitive: false,
            scope: self.scope,
            respond_to_self: self.respond_to_self,
            cooldown: self.cooldown,
        };
        let Some(resolved) = policy::evaluate(
            &nick,
            &channel,
            &body,
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

/// Parse a PRIVMSG and unwrap its CTCP payload if the keyword matches.
/// Returns (channel, nick, payload).
fn ctcp_payload(args: &HandlerArgs, keyword: &str) -> Option<(String, String, String)> {
    let msg = policy::parse_privmsg(&args.line)?;
    let (kw, payload) = policy::ctcp(&msg.message)?;
    if !kw.eq_ignore_ascii_case(keyword) {
        return None;
    }
    Some((msg.channel, msg.nick, payload.to_string()))
}
