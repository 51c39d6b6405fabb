//! Shared line-classification and response policy.
//!
//! Everything PRIVMSG-shaped (plain messages, CTCP ACTION, CTCP PING)
//! runs the same pipeline: prefix parse, blacklist, bridge-bot
//! rewriting, placeholder liquefaction, regex match, self-suppression,
//! scope filtering, per-channel cooldown, and the PM reply rewrite.
//! Join/part/kick and ping/pong get their own simpler parsers here too,
//! so every regex in the system lives in one module.
//!
//! Prefix parsing accepts all three legal shapes: `nick!user@host`,
//! `nick@host`, and a bare nick or server name.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use crate::config::{BRIDGE_MESSAGE_GROUP, BRIDGE_USER_GROUP, BotConfig};
use crate::handlers::HandlerArgs;

const PREFIX: &str = r"^:(?P<nick>[^!@\s]+)(?:!(?P<user>[^@\s]+))?(?:@(?P<host>\S+))?";

static PRIVMSG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{PREFIX}\s+PRIVMSG\s+(?P<channel>\S+)\s+:(?P<message>.*)$"
    ))
    .expect("privmsg pattern")
});

static JOIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{PREFIX}\s+JOIN\s+:?(?P<channel>\S+)\s*$")).expect("join pattern")
});

static PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{PREFIX}\s+PART\s+(?P<channel>\S+)(?:\s+:(?P<reason>.*))?$"
    ))
    .expect("part pattern")
});

static KICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{PREFIX}\s+KICK\s+(?P<channel>\S+)\s+(?P<kicked>\S+)(?:\s+:(?P<reason>.*))?$"
    ))
    .expect("kick pattern")
});

static PING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PING\s+:?(?P<payload>.*)$").expect("ping pattern"));

static PONG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?::(?P<server>\S+)\s+)?PONG\s+(?:(?P<target>\S+)\s+)?:?(?P<payload>.*)$")
        .expect("pong pattern")
});

/// A parsed PRIVMSG line, before any policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivMsgLine {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
    pub channel: String,
    pub message: String,
}

pub fn parse_privmsg(line: &str) -> Option<PrivMsgLine> {
    let caps = PRIVMSG_RE.captures(line)?;
    Some(PrivMsgLine {
        nick: caps["nick"].to_string(),
        user: caps.name("user").map(|m| m.as_str().to_string()),
        host: caps.name("host").map(|m| m.as_str().to_string()),
        channel: caps["channel"].to_string(),
        message: caps["message"].to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipLine {
    pub nick: String,
    pub channel: String,
    pub reason: Option<String>,
}

pub fn parse_join(line: &str) -> Option<MembershipLine> {
    let caps = JOIN_RE.captures(line)?;
    Some(MembershipLine {
        nick: caps["nick"].to_string(),
        channel: caps["channel"].to_string(),
        reason: None,
    })
}

pub fn parse_part(line: &str) -> Option<MembershipLine> {
    let caps = PART_RE.captures(line)?;
    Some(MembershipLine {
        nick: caps["nick"].to_string(),
        channel: caps["channel"].to_string(),
        reason: caps.name("reason").map(|m| m.as_str().to_string()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickLine {
    pub kicker: String,
    pub channel: String,
    pub kicked: String,
    pub reason: Option<String>,
}

pub fn parse_kick(line: &str) -> Option<KickLine> {
    let caps = KICK_RE.captures(line)?;
    Some(KickLine {
        kicker: caps["nick"].to_string(),
        channel: caps["channel"].to_string(),
        kicked: caps["kicked"].to_string(),
        reason: caps.name("reason").map(|m| m.as_str().to_string()),
    })
}

/// Server-to-client PING; the payload must be echoed back in a PONG.
pub fn parse_server_ping(line: &str) -> Option<String> {
    PING_RE
        .captures(line)
        .map(|caps| caps["payload"].to_string())
}

/// Server PONG; carries back whatever our PING probe sent.
pub fn parse_pong(line: &str) -> Option<String> {
    PONG_RE
        .captures(line)
        .map(|caps| caps["payload"].to_string())
}

/// Unwrap a CTCP-framed message body into (keyword, rest).
pub fn ctcp(message: &str) -> Option<(&str, &str)> {
    let inner = message.strip_prefix('\u{1}')?.strip_suffix('\u{1}')?;
    match inner.split_once(' ') {
        Some((keyword, rest)) => Some((keyword, rest)),
        None => Some((inner, "")),
    }
}

/// True when a more specific PRIVMSG subtype (CTCP ACTION or CTCP PING)
/// owns this message body, so the plain message handler must defer.
pub fn is_ctcp_subtype(message: &str) -> bool {
    matches!(
        ctcp(message),
        Some((keyword, _))
            if keyword.eq_ignore_ascii_case("ACTION") || keyword.eq_ignore_ascii_case("PING")
    )
}

/// Where a PRIVMSG-shaped handler is willing to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseScope {
    /// Only private messages (channel == our own nick).
    PmsOnly,
    /// Only configured channels.
    ChannelOnly,
    #[default]
    ChannelAndPms,
}

/// The policy knobs shared by message/action/ctcp-ping handlers.
pub struct PrivmsgPolicy<'a> {
    pub line_regex: &'a str,
    pub case_insensitive: bool,
    pub scope: ResponseScope,
    pub respond_to_self: bool,
    pub cooldown: Duration,
}

/// A message that survived the whole pipeline, with bridge and PM
/// rewrites applied. `channel` is where a reply should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub user: String,
    pub channel: String,
    pub message: String,
}

/// Run the shared pipeline over one parsed message body.
///
/// `body` is what the handler's own regex tests: the raw message for
/// plain handlers, the CTCP payload for ACTION/PING handlers.
/// `cooldowns` is the handler's own per-channel last-fire map, updated
/// on a successful match.
pub fn evaluate(
    nick: &str,
    channel: &str,
    body: &str,
    args: &HandlerArgs,
    policy: &PrivmsgPolicy<'_>,
    cooldowns: &mut HashMap<String, Instant>,
) -> Option<ResolvedMessage> {
    let config = &args.config;

    if is_blacklisted(&args.blacklist, channel) {
        return None;
    }

    let (user, message) = apply_bridge_rewrite(config, nick, body);

    let pattern = liquefy(policy.line_regex, &user, &config.nick, channel);
    let regex = match RegexBuilder::new(&pattern)
        .case_insensitive(policy.case_insensitive)
        .build()
    {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "handler regex failed to compile");
            return None;
        }
    };
    if !regex.is_match(&message) {
        return None;
    }

    if !policy.respond_to_self && user.eq_ignore_ascii_case(&config.nick) {
        return None;
    }

    let is_pm = channel.eq_ignore_ascii_case(&config.nick);
    match policy.scope {
        ResponseScope::PmsOnly if !is_pm => return None,
        ResponseScope::ChannelOnly if !config.has_channel(channel) => return None,
        _ => {}
    }

    if !policy.cooldown.is_zero() {
        let key = channel.to_lowercase();
        if let Some(last) = cooldowns.get(&key)
            && last.elapsed() <= policy.cooldown
        {
            return None;
        }
        cooldowns.insert(key, Instant::now());
    }

    // Replies to a PM should route back to the sender, not to our own
    // nick.
    let channel = if is_pm { user.clone() } else { channel.to_string() };

    Some(ResolvedMessage {
        user,
        channel,
        message,
    })
}

pub fn is_blacklisted(blacklist: &[String], channel: &str) -> bool {
    blacklist.iter().any(|c| c.eq_ignore_ascii_case(channel))
}

/// Rewrite a relayed message back to its real sender.
///
/// The first bridge bot whose nick pattern matches and whose message
/// pattern captures non-empty `bridgeUser`/`bridgeMessage` groups wins.
pub fn apply_bridge_rewrite(config: &BotConfig, nick: &str, message: &str) -> (String, String) {
    for bot in &config.bridge_bots {
        let Ok(nick_re) = Regex::new(&bot.nick_pattern) else {
            continue;
        };
        if !nick_re.is_match(nick) {
            continue;
        }
        let Ok(message_re) = Regex::new(&bot.message_pattern) else {
            continue;
        };
        if let Some(caps) = message_re.captures(message) {
            let user = caps.name(BRIDGE_USER_GROUP).map_or("", |m| m.as_str());
            let text = caps.name(BRIDGE_MESSAGE_GROUP).map_or("", |m| m.as_str());
            if !user.is_empty() && !text.is_empty() {
                return (user.to_string(), text.to_string());
            }
        }
    }
    (nick.to_string(), message.to_string())
}

/// Substitute the `{%user%}`, `{%nick%}` and `{%channel%}` placeholders
/// with (escaped) literal values before compiling a handler regex.
pub fn liquefy(pattern: &str, user: &str, bot_nick: &str, channel: &str) -> String {
    pattern
        .replace("{%user%}", &regex::escape(user))
        .replace("{%nick%}", &regex::escape(bot_nick))
        .replace("{%channel%}", &regex::escape(channel))
}
