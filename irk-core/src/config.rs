//! Bot configuration.
//!
//! `BotConfig` is an immutable snapshot once handed to the connection.
//! It deserializes from TOML (every field has a default so partial files
//! work) and is validated with [`BotConfig::validate`] before any
//! connection attempt. Validation aggregates every violation found.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum quit message length accepted by validation.
pub const QUIT_MESSAGE_MAX: usize = 160;

/// Named capture groups every bridge-bot message pattern must define.
pub const BRIDGE_USER_GROUP: &str = "bridgeUser";
pub const BRIDGE_MESSAGE_GROUP: &str = "bridgeMessage";

/// A bridge bot: a relay (telegram/discord/matrix gateway) whose IRC nick
/// matches `nick_pattern` and whose relayed messages embed the real
/// sender. `message_pattern` must capture `bridgeUser` and
/// `bridgeMessage` named groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeBotConfig {
    pub nick_pattern: String,
    pub message_pattern: String,
}

/// Immutable connection/runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Server host name or address (no port).
    pub server: String,
    pub port: u16,
    pub use_tls: bool,

    pub nick: String,
    pub user_name: String,
    pub real_name: String,

    /// PASS sent before registration when set.
    pub server_password: Option<String>,
    /// When set, `IDENTIFY <password>` is sent to `nickserv_nick` after
    /// registration.
    pub nickserv_password: Option<String>,
    pub nickserv_nick: String,

    pub channels: Vec<String>,
    /// Nicks allowed to drive admin-only plugin commands.
    pub admins: Vec<String>,
    pub bridge_bots: Vec<BridgeBotConfig>,

    /// Delay inserted after each wire write (flood protection).
    pub rate_limit_ms: u64,
    pub quit_message: String,
    /// Watchdog probe interval and per-probe timeout.
    pub watchdog_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 6667,
            use_tls: false,
            nick: "irk".to_string(),
            user_name: "irk".to_string(),
            real_name: "irk bot".to_string(),
            server_password: None,
            nickserv_password: None,
            nickserv_nick: "NickServ".to_string(),
            channels: Vec::new(),
            admins: Vec::new(),
            bridge_bots: Vec::new(),
            rate_limit_ms: 800,
            quit_message: "Shutting down".to_string(),
            watchdog_timeout_secs: 60,
        }
    }
}

impl BotConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    /// Check every invariant, collecting all violations into one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.server.trim().is_empty() {
            violations.push("server must not be empty".to_string());
        }
        if self.nick.trim().is_empty() {
            violations.push("nick must not be empty".to_string());
        }
        if self.user_name.trim().is_empty() {
            violations.push("user_name must not be empty".to_string());
        }

        if self.channels.is_empty() {
            violations.push("at least one channel must be configured".to_string());
        }
        for channel in &self.channels {
            if channel.trim().is_empty() {
                violations.push("channel names must not be empty".to_string());
            }
        }

        if self.quit_message.chars().count() > QUIT_MESSAGE_MAX {
            violations.push(format!(
                "quit_message must be at most {QUIT_MESSAGE_MAX} characters"
            ));
        }
        if self.quit_message.contains('\n') || self.quit_message.contains('\r') {
            violations.push("quit_message must not contain newlines".to_string());
        }

        if self.watchdog_timeout_secs == 0 {
            violations.push("watchdog_timeout_secs must be greater than zero".to_string());
        }

        for bot in &self.bridge_bots {
            if let Err(e) = regex::Regex::new(&bot.nick_pattern) {
                violations.push(format!(
                    "bridge bot nick pattern {:?} does not compile: {e}",
                    bot.nick_pattern
                ));
            }
            match regex::Regex::new(&bot.message_pattern) {
                Ok(re) => {
                    for group in [BRIDGE_USER_GROUP, BRIDGE_MESSAGE_GROUP] {
                        if !re.capture_names().flatten().any(|name| name == group) {
                            violations.push(format!(
                                "bridge bot message pattern {:?} is missing the \
                                 named capture group {group:?}",
                                bot.message_pattern
                            ));
                        }
                    }
                }
                Err(e) => violations.push(format!(
                    "bridge bot message pattern {:?} does not compile: {e}",
                    bot.message_pattern
                )),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations })
        }
    }

    /// True when `channel` is one of the configured channels
    /// (IRC channel names compare case-insensitively).
    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BotConfig {
        BotConfig {
            server: "irc.example.net".to_string(),
            channels: vec!["#irk".to_string()],
            ..BotConfig::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn violations_are_aggregated() {
        let config = BotConfig {
            server: String::new(),
            channels: Vec::new(),
            quit_message: "a".repeat(QUIT_MESSAGE_MAX + 1),
            watchdog_timeout_secs: 0,
            ..BotConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.violations.len(), 4);
    }

    #[test]
    fn quit_message_rejects_newlines() {
        let config = BotConfig {
            quit_message: "bye\nworld".to_string(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.violations[0].contains("newline"));
    }

    #[test]
    fn bridge_bot_requires_named_groups() {
        let config = BotConfig {
            bridge_bots: vec![BridgeBotConfig {
                nick_pattern: "telegrambot".to_string(),
                message_pattern: r"(\w+):\s+(.+)".to_string(),
            }],
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        // Missing both bridgeUser and bridgeMessage.
        assert_eq!(err.violations.len(), 2);
    }

    #[test]
    fn bridge_bot_with_named_groups_passes() {
        let config = BotConfig {
            bridge_bots: vec![BridgeBotConfig {
                nick_pattern: "telegrambot\\d*".to_string(),
                message_pattern: r"(?<bridgeUser>\w+):\s+(?<bridgeMessage>.+)".to_string(),
            }],
            ..valid_config()
        };
        config.validate().unwrap();
    }
}
