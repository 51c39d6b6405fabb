//! Outbound writer queue and the IRC writer contract.
//!
//! Every wire write funnels through one [`ActionChannel`], so writes
//! happen in the order the `send_*` methods were called no matter which
//! task called them. Each write takes the shared transport lock (the
//! same lock the disconnect path takes, so a write can never race a
//! half-closed socket), then sleeps the configured rate-limit delay.
//!
//! Long payloads are split to stay under the 512-byte IRC line limit:
//! on newlines first, then at [`SPLIT_LIMIT`] characters, with every
//! line but the last suffixed by the continuation marker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::sync::oneshot;

use crate::action_channel::{ActionChannel, ActionSender};
use crate::config::BotConfig;
use crate::core_events::{EventSink, core_event, names};
use crate::transport::TransportWriter;

/// Character budget per wire line, leaving room for command, target,
/// and CRLF inside the 512-byte protocol limit.
pub const SPLIT_LIMIT: usize = 400;

/// Suffix on every continuation line except the last.
pub const MORE_MARKER: &str = " <more>";

const CTCP_DELIM: char = '\u{1}';

/// The transport's write half, shared between the writer queue and the
/// disconnect path. `None` while disconnected.
pub type SharedTransport = Arc<tokio::sync::Mutex<Option<TransportWriter>>>;

/// Owner of the writer queue worker.
pub struct WriterQueue {
    chan: ActionChannel,
}

impl WriterQueue {
    pub fn new() -> Self {
        Self {
            chan: ActionChannel::new("writer"),
        }
    }

    pub fn start(&self) {
        self.chan.start();
    }

    pub async fn close_and_drain(&self) {
        self.chan.close_and_drain().await;
    }

    pub fn abort(&self) {
        self.chan.abort();
    }

    pub fn writer(
        &self,
        transport: SharedTransport,
        config: Arc<BotConfig>,
        events: EventSink,
    ) -> IrcWriter {
        IrcWriter {
            sender: self.chan.sender(),
            transport,
            config,
            events,
        }
    }
}

impl Default for WriterQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap-to-clone handle implementing the IRC writer contract.
///
/// All methods are synchronous enqueues; none of them blocks or fails
/// at the call site. Each outbound operation first emits an audit event
/// into the dispatch queue for plugins observing outbound traffic.
#[derive(Clone)]
pub struct IrcWriter {
    sender: ActionSender,
    transport: SharedTransport,
    config: Arc<BotConfig>,
    events: EventSink,
}

impl IrcWriter {
    pub fn config(&self) -> &Arc<BotConfig> {
        &self.config
    }

    /// PRIVMSG to a channel or nick.
    pub fn send_message(&self, message: &str, channel: &str) {
        self.events.emit(core_event(
            names::SEND_MESSAGE,
            &[("channel", channel), ("message", message)],
        ));
        for piece in split_payload(message) {
            self.enqueue_write(format!("PRIVMSG {channel} :{piece}"));
        }
    }

    /// PRIVMSG to every configured channel.
    pub fn send_broadcast_message(&self, message: &str) {
        for channel in self.config.channels.clone() {
            self.send_message(message, &channel);
        }
    }

    /// CTCP ACTION ("/me") to a channel or nick.
    pub fn send_action(&self, message: &str, channel: &str) {
        self.events.emit(core_event(
            names::SEND_ACTION,
            &[("channel", channel), ("message", message)],
        ));
        for piece in split_payload(message) {
            self.enqueue_write(format!(
                "PRIVMSG {channel} :{CTCP_DELIM}ACTION {piece}{CTCP_DELIM}"
            ));
        }
    }

    pub fn send_notice(&self, message: &str, target: &str) {
        self.events.emit(core_event(
            names::SEND_NOTICE,
            &[("channel", target), ("message", message)],
        ));
        for piece in split_payload(message) {
            self.enqueue_write(format!("NOTICE {target} :{piece}"));
        }
    }

    /// CTCP PING reply (goes out as a NOTICE per the CTCP convention).
    pub fn send_ctcp_pong(&self, target: &str, payload: &str) {
        self.events.emit(core_event(
            names::SEND_NOTICE,
            &[("channel", target), ("message", payload)],
        ));
        self.enqueue_write(format!(
            "NOTICE {target} :{CTCP_DELIM}PING {payload}{CTCP_DELIM}"
        ));
    }

    /// CTCP VERSION reply.
    pub fn send_ctcp_version_response(&self, target: &str, version: &str) {
        self.events.emit(core_event(
            names::SEND_NOTICE,
            &[("channel", target), ("message", version)],
        ));
        self.enqueue_write(format!(
            "NOTICE {target} :{CTCP_DELIM}VERSION {version}{CTCP_DELIM}"
        ));
    }

    pub fn send_join(&self, channel: &str) {
        self.events
            .emit(core_event(names::SEND_JOIN, &[("channel", channel)]));
        self.enqueue_write(format!("JOIN {channel}"));
    }

    pub fn send_part(&self, channel: &str) {
        self.events
            .emit(core_event(names::SEND_PART, &[("channel", channel)]));
        self.enqueue_write(format!("PART {channel}"));
    }

    pub fn send_part_with_reason(&self, channel: &str, reason: &str) {
        self.events.emit(core_event(
            names::SEND_PART,
            &[("channel", channel), ("reason", reason)],
        ));
        self.enqueue_write(format!("PART {channel} :{reason}"));
    }

    pub fn send_kick(&self, user: &str, channel: &str) {
        self.events.emit(core_event(
            names::SEND_KICK,
            &[("channel", channel), ("user", user)],
        ));
        self.enqueue_write(format!("KICK {channel} {user}"));
    }

    pub fn send_kick_with_reason(&self, user: &str, channel: &str, reason: &str) {
        self.events.emit(core_event(
            names::SEND_KICK,
            &[("channel", channel), ("user", user), ("reason", reason)],
        ));
        self.enqueue_write(format!("KICK {channel} {user} :{reason}"));
    }

    /// Raw wire line, passed through untouched (no splitting).
    pub fn send_raw(&self, line: &str) {
        self.events
            .emit(core_event(names::SEND_RAW, &[("line", line)]));
        self.enqueue_write(line.to_string());
    }

    /// Registration traffic (PASS, USER, NICK, NickServ IDENTIFY) and
    /// QUIT: serialized like everything else but never audited, so
    /// passwords stay out of the dispatch stream.
    pub(crate) fn enqueue_unaudited(&self, line: String) {
        self.enqueue_write(line);
    }

    /// PONG reply. Liveness plumbing; not audited.
    pub fn send_pong(&self, payload: &str) {
        self.enqueue_write(format!("PONG :{payload}"));
    }

    /// Client-to-server PING probe. Liveness plumbing; not audited.
    pub fn send_ping(&self, payload: &str) {
        self.enqueue_write(format!("PING :{payload}"));
    }

    /// Wait until every write enqueued before this call has hit the
    /// wire, bounded by `timeout`. True on drain, false on timeout.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (tx, rx) = oneshot::channel();
        self.sender.begin_invoke(async move {
            let _ = tx.send(());
            Ok(())
        });
        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }

    fn enqueue_write(&self, line: String) {
        let transport = self.transport.clone();
        let delay = self.config.rate_limit();
        self.sender.begin_invoke(async move {
            {
                let mut guard = transport.lock().await;
                match guard.as_mut() {
                    Some(writer) => writer.write_line(&line).await?,
                    None => bail!("dropping write, transport is closed: {line:?}"),
                }
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        });
    }
}

/// Split an outbound payload into wire-sized pieces.
pub(crate) fn split_payload(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    for line in text.split('\n') {
        let mut rest = line.trim_end_matches('\r');
        loop {
            match nth_char_boundary(rest, SPLIT_LIMIT) {
                Some(cut) => {
                    pieces.push(rest[..cut].to_string());
                    rest = &rest[cut..];
                }
                None => {
                    pieces.push(rest.to_string());
                    break;
                }
            }
        }
    }
    let last = pieces.len().saturating_sub(1);
    for piece in &mut pieces[..last] {
        piece.push_str(MORE_MARKER);
    }
    pieces
}

/// Byte index after `n` chars, or `None` if the string is that short.
fn nth_char_boundary(s: &str, n: usize) -> Option<usize> {
    let mut count = 0;
    for (i, _) in s.char_indices() {
        if count == n {
            return Some(i);
        }
        count += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::make_halves;

    fn test_setup(rate_limit_ms: u64) -> (WriterQueue, IrcWriter, crate::transport::TransportReader)
    {
        let (a, b) = tokio::io::duplex(1 << 16);
        let (_ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        let (_, writer_half) = make_halves(tokio::io::empty(), aw);
        let (peer_reader, _peer_writer) = make_halves(br, bw);

        let config = Arc::new(BotConfig {
            server: "irc.example.net".to_string(),
            channels: vec!["#one".to_string(), "#two".to_string()],
            rate_limit_ms,
            ..BotConfig::default()
        });
        let queue = WriterQueue::new();
        queue.start();
        let transport: SharedTransport = Arc::new(tokio::sync::Mutex::new(Some(writer_half)));
        let writer = queue.writer(transport, config, EventSink::new());
        (queue, writer, peer_reader)
    }

    #[test]
    fn short_payload_is_one_piece() {
        assert_eq!(split_payload("hello"), vec!["hello".to_string()]);
    }

    #[test]
    fn long_payload_splits_with_marker() {
        let k = 37;
        let text = "x".repeat(SPLIT_LIMIT + k);
        let pieces = split_payload(&text);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0], format!("{}{}", "x".repeat(SPLIT_LIMIT), MORE_MARKER));
        assert_eq!(pieces[1], "x".repeat(k));
    }

    #[test]
    fn newlines_split_before_length() {
        let pieces = split_payload("one\ntwo\nthree");
        assert_eq!(
            pieces,
            vec![
                format!("one{MORE_MARKER}"),
                format!("two{MORE_MARKER}"),
                "three".to_string()
            ]
        );
    }

    #[test]
    fn split_respects_char_boundaries() {
        let text = "é".repeat(SPLIT_LIMIT + 1);
        let pieces = split_payload(&text);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].chars().count(), SPLIT_LIMIT + MORE_MARKER.chars().count());
    }

    #[tokio::test]
    async fn writes_arrive_in_send_order() {
        let (_queue, writer, mut peer) = test_setup(0);
        writer.send_message("first", "#one");
        writer.send_notice("second", "#one");
        writer.send_join("#two");
        assert!(writer.flush(Duration::from_secs(5)).await);

        assert_eq!(peer.read_line().await.unwrap().unwrap(), "PRIVMSG #one :first");
        assert_eq!(peer.read_line().await.unwrap().unwrap(), "NOTICE #one :second");
        assert_eq!(peer.read_line().await.unwrap().unwrap(), "JOIN #two");
    }

    #[tokio::test]
    async fn long_message_produces_two_wire_lines() {
        let (_queue, writer, mut peer) = test_setup(0);
        let text = format!("{}{}", "a".repeat(SPLIT_LIMIT), "tail");
        writer.send_message(&text, "#one");
        assert!(writer.flush(Duration::from_secs(5)).await);

        let first = peer.read_line().await.unwrap().unwrap();
        let second = peer.read_line().await.unwrap().unwrap();
        assert_eq!(
            first,
            format!("PRIVMSG #one :{}{}", "a".repeat(SPLIT_LIMIT), MORE_MARKER)
        );
        assert_eq!(second, "PRIVMSG #one :tail");
    }

    #[tokio::test]
    async fn action_is_ctcp_wrapped_per_line() {
        let (_queue, writer, mut peer) = test_setup(0);
        writer.send_action("waves", "#one");
        assert!(writer.flush(Duration::from_secs(5)).await);
        assert_eq!(
            peer.read_line().await.unwrap().unwrap(),
            "PRIVMSG #one :\u{1}ACTION waves\u{1}"
        );
    }

    #[tokio::test]
    async fn broadcast_hits_every_channel() {
        let (_queue, writer, mut peer) = test_setup(0);
        writer.send_broadcast_message("hi all");
        assert!(writer.flush(Duration::from_secs(5)).await);
        assert_eq!(peer.read_line().await.unwrap().unwrap(), "PRIVMSG #one :hi all");
        assert_eq!(peer.read_line().await.unwrap().unwrap(), "PRIVMSG #two :hi all");
    }

    #[tokio::test]
    async fn write_without_transport_is_dropped_not_fatal() {
        let (_queue, writer, mut peer) = test_setup(0);
        {
            let transport = writer.transport.clone();
            let mut guard = transport.lock().await;
            if let Some(mut w) = guard.take() {
                w.shutdown().await;
            }
        }
        writer.send_message("into the void", "#one");
        // Queue keeps running: flush still completes.
        assert!(writer.flush(Duration::from_secs(5)).await);
        assert!(peer.read_line().await.unwrap().is_none());
    }
}
