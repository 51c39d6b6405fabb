//! Server liveness handlers.
//!
//! PING is answered on the reader task directly (not through the
//! dispatch queue) so liveness survives a stalled dispatch worker; the
//! connection holds its own [`PingHandler::pong_responder`] for that.
//! PONG feeds the watchdog: [`PongHandler`] recognizes the probe token
//! and resets the timer.

use crate::handlers::policy;
use crate::handlers::{Flow, HandlerArgs};
use crate::writer::IrcWriter;

pub struct PingArgs {
    pub writer: IrcWriter,
    /// Payload the server expects echoed back.
    pub payload: String,
}

pub type PingCallback = Box<dyn FnMut(&PingArgs) -> anyhow::Result<Flow> + Send>;

pub struct PingHandler {
    callback: PingCallback,
}

impl PingHandler {
    pub fn new(callback: PingCallback) -> Self {
        Self { callback }
    }

    /// The standard behavior: reply with a PONG echoing the payload.
    pub fn pong_responder() -> Self {
        Self::new(Box::new(|args| {
            args.writer.send_pong(&args.payload);
            Ok(Flow::Continue)
        }))
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(payload) = policy::parse_server_ping(&args.line) else {
            return Ok(Flow::Continue);
        };
        (self.callback)(&PingArgs {
            writer: args.writer.clone(),
            payload,
        })
    }
}

pub struct PongArgs {
    pub writer: IrcWriter,
    pub payload: String,
}

pub type PongCallback = Box<dyn FnMut(&PongArgs) -> anyhow::Result<Flow> + Send>;

pub struct PongHandler {
    /// When set, only fire for payloads containing this token (the
    /// watchdog's probe recognition).
    expected_token: Option<String>,
    callback: PongCallback,
}

impl PongHandler {
    pub fn new(callback: PongCallback) -> Self {
        Self {
            expected_token: None,
            callback,
        }
    }

    pub fn expecting_token(token: impl Into<String>, callback: PongCallback) -> Self {
        Self {
            expected_token: Some(token.into()),
            callback,
        }
    }

    pub fn handle(&mut self, args: &HandlerArgs) -> anyhow::Result<Flow> {
        let Some(payload) = policy::parse_pong(&args.line) else {
            return Ok(Flow::Continue);
        };
        if let Some(token) = &self.expected_token
            && !payload.contains(token.as_str())
        {
            return Ok(Flow::Continue);
        }
        (self.callback)(&PongArgs {
            writer: args.writer.clone(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::args_for_line;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ping_fires_with_payload() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let cb = seen.clone();
        let mut handler = PingHandler::new(Box::new(move |args| {
            *cb.lock() = Some(args.payload.clone());
            Ok(Flow::Continue)
        }));
        handler.handle(&args_for_line("PING :abc123")).unwrap();
        assert_eq!(seen.lock().take().as_deref(), Some("abc123"));
    }

    #[test]
    fn pong_token_filter() {
        let count = Arc::new(AtomicUsize::new(0));
        let cb = count.clone();
        let mut handler = PongHandler::expecting_token(
            "irk-probe",
            Box::new(move |_| {
                cb.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue)
            }),
        );
        handler
            .handle(&args_for_line(":srv PONG srv :something-else"))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        handler
            .handle(&args_for_line(":srv PONG srv :irk-probe"))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
