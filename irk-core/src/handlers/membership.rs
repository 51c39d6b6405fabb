//! Channel membership handlers: JOIN, PART, KICK.

use crate::handlers::policy;
use crate::handlers::{Flow, HandlerArgs};
use crate::writer::IrcWriter;

pub struct JoinArgs {
    pub writer: IrcWriter,
    pub user: String,
    pub channel: String,
}

pub type JoinCallback = Box<dyn FnMut(&JoinArgs) -> anyhow::Result<Flow> + Send>;

/// Fires when someone joins a channel we are in.
pub struct JoinHandler {
    callback: JoinCallback,
    respond_to_self: bool,
}

impl JoinHandler {
    pub fn new(callback: JoinCallback) -> Self {
        Self {
            callback,
            respond_to_self: false,
        }
    }

    /// Also fire for our own joins (e.g. to greet a channel on entry).
    pub fn respond_to_self(mut self, value: bool) -> Self {
        self.respond_to_self = value;
        self
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(join) = policy::parse_join(&args.line) else {
            return Ok(Flow::Continue);
        };
        if policy::is_blacklisted(&args.blacklist, &join.channel) {
            return Ok(Flow::Continue);
        }
        if !self.respond_to_self && join.nick.eq_ignore_ascii_case(&args.config.nick) {
            return Ok(Flow::Continue);
        }
        (self.callback)(&JoinArgs {
            writer: args.writer.clone(),
            user: join.nick,
            channel: join.channel,
        })
    }
}

pub struct PartArgs {
    pub writer: IrcWriter,
    pub user: String,
    pub channel: String,
    pub reason: Option<String>,
}

pub type PartCallback = Box<dyn FnMut(&PartArgs) -> anyhow::Result<Flow> + Send>;

/// Fires when someone leaves a channel we are in.
pub struct PartHandler {
    callback: PartCallback,
    respond_to_self: bool,
}

impl PartHandler {
    pub fn new(callback: PartCallback) -> Self {
        Self {
            callback,
            respond_to_self: false,
        }
    }

    pub fn respond_to_self(mut self, value: bool) -> Self {
        self.respond_to_self = value;
        self
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(part) = policy::parse_part(&args.line) else {
            return Ok(Flow::Continue);
        };
        if policy::is_blacklisted(&args.blacklist, &part.channel) {
            return Ok(Flow::Continue);
        }
        if !self.respond_to_self && part.nick.eq_ignore_ascii_case(&args.config.nick) {
            return Ok(Flow::Continue);
        }
        (self.callback)(&PartArgs {
            writer: args.writer.clone(),
            user: part.nick,
            channel: part.channel,
            reason: part.reason,
        })
    }
}

pub struct KickArgs {
    pub writer: IrcWriter,
    pub kicker: String,
    pub channel: String,
    pub kicked: String,
    pub reason: Option<String>,
}

pub type KickCallback = Box<dyn FnMut(&KickArgs) -> anyhow::Result<Flow> + Send>;

/// Fires when someone is kicked from a channel we are in.
///
/// Self-involvement is filtered on two independent axes: us doing the
/// kicking, and us being kicked.
pub struct KickHandler {
    callback: KickCallback,
    respond_when_self_kicker: bool,
    respond_when_self_kicked: bool,
}

impl KickHandler {
    pub fn new(callback: KickCallback) -> Self {
        Self {
            callback,
            respond_when_self_kicker: false,
            respond_when_self_kicked: false,
        }
    }

    pub fn respond_when_self_kicker(mut self, value: bool) -> Self {
        self.respond_when_self_kicker = value;
        self
    }

    pub fn respond_when_self_kicked(mut self, value: bool) -> Self {
        self.respond_when_self_kicked = value;
        self
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(kick) = policy::parse_kick(&args.line) else {
            return Ok(Flow::Continue);
        };
        if policy::is_blacklisted(&args.blacklist, &kick.channel) {
            return Ok(Flow::Continue);
        }
        let nick = &args.config.nick;
        if !self.respond_when_self_kicker && kick.kicker.eq_ignore_ascii_case(nick) {
            return Ok(Flow::Continue);
        }
        if !self.respond_when_self_kicked && kick.kicked.eq_ignore_ascii_case(nick) {
            return Ok(Flow::Continue);
        }
        (self.callback)(&KickArgs {
            writer: args.writer.clone(),
            kicker: kick.kicker,
            channel: kick.channel,
            kicked: kick.kicked,
            reason: kick.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{args_for_line, test_args, test_config};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_join() -> (JoinHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let cb = count.clone();
        let handler = JoinHandler::new(Box::new(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }));
        (handler, count)
    }

    #[test]
    fn join_fires_for_others() {
        let (mut handler, count) = counting_join();
        let args = args_for_line(":alice!~a@h JOIN :#chan");
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_suppresses_self_unless_configured() {
        let (mut handler, count) = counting_join();
        let args = args_for_line(":irkbot!~b@h JOIN :#chan");
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let (handler, count) = counting_join();
        let mut handler = handler.respond_to_self(true);
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_respects_blacklist() {
        let (mut handler, count) = counting_join();
        let mut args = test_args(test_config(), vec!["#chan".to_string()]);
        args.line = ":alice!~a@h JOIN :#chan".to_string();
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn part_carries_reason() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let cb = seen.clone();
        let mut handler = PartHandler::new(Box::new(move |args| {
            *cb.lock() = Some((args.user.clone(), args.reason.clone()));
            Ok(Flow::Continue)
        }));
        let args = args_for_line(":alice!~a@h PART #chan :gone fishing");
        handler.handle(&args).unwrap();
        let (user, reason) = seen.lock().take().unwrap();
        assert_eq!(user, "alice");
        assert_eq!(reason.as_deref(), Some("gone fishing"));
    }

    #[test]
    fn part_and_kick_respect_blacklist() {
        let part_count = Arc::new(AtomicUsize::new(0));
        let cb = part_count.clone();
        let mut part = PartHandler::new(Box::new(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }));
        let kick_count = Arc::new(AtomicUsize::new(0));
        let cb = kick_count.clone();
        let mut kick = KickHandler::new(Box::new(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }));

        let mut args = test_args(test_config(), vec!["#chan".to_string()]);
        args.line = ":alice!~a@h PART #chan :bye".to_string();
        part.handle(&args).unwrap();
        args.line = ":op!~o@h KICK #chan victim :bye".to_string();
        kick.handle(&args).unwrap();

        assert_eq!(part_count.load(Ordering::SeqCst), 0);
        assert_eq!(kick_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn kick_self_axes_are_independent() {
        let count = Arc::new(AtomicUsize::new(0));
        let cb = count.clone();
        let mut handler = KickHandler::new(Box::new(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }));

        // We are the kicker: suppressed by default.
        let args = args_for_line(":irkbot!~b@h KICK #chan victim :bye");
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // We are the one kicked: suppressed by default.
        let args = args_for_line(":op!~o@h KICK #chan irkbot :bye");
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Unrelated kick fires.
        let args = args_for_line(":op!~o@h KICK #chan victim :bye");
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kick_fires_when_self_kicked_is_enabled() {
        let count = Arc::new(AtomicUsize::new(0));
        let cb = count.clone();
        let mut handler = KickHandler::new(Box::new(move |_| {
            cb.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }))
        .respond_when_self_kicked(true);

        let args = args_for_line(":op!~o@h KICK #chan irkbot :bye");
        handler.handle(&args).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
