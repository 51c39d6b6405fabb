//! Connection orchestration.
//!
//! Owns the transport, the writer queue, the reader task, the watchdog
//! and the reconnect state machine, and wires them to the dispatch
//! queue. The state machine is
//! `Uninitialized → Initialized → Connected → (Disconnected →
//! Reconnecting → Connected)* → Disposed`; driving it out of order is a
//! [`StateError`], which is a different failure family from transport
//! faults (those are recovered by the watchdog, not reported to the
//! caller).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::action_channel::ActionChannel;
use crate::bus::BusFactory;
use crate::config::BotConfig;
use crate::core_events::{EventSink, core_event, names};
use crate::dispatch::{DispatchQueue, Plugin};
use crate::error::{ConfigError, ConnectionError, StateError};
use crate::handlers::{Flow, HandlerArgs, PingHandler, PongHandler};
use crate::scheduler::{EventId, Scheduler};
use crate::transport::{self, TransportReader};
use crate::watchdog::{PROBE_TOKEN, Watchdog};
use crate::writer::{IrcWriter, SharedTransport, WriterQueue};

/// Upper bound on waiting for the channel JOINs to drain.
const JOIN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect backoff: one minute more per failed attempt, capped at
/// ten minutes.
const BACKOFF_STEP: Duration = Duration::from_secs(60);
const BACKOFF_CAP: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initialized,
    Connected,
    Disconnected,
    Reconnecting,
    Disposed,
}

/// A single IRC server connection plus its dispatch pipeline.
pub struct Connection {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    config: Arc<BotConfig>,
    state: Mutex<ConnectionState>,
    transport: SharedTransport,
    writer_queue: WriterQueue,
    writer: IrcWriter,
    dispatch: DispatchQueue,
    events: EventSink,
    keep_reading: AtomicBool,
    /// Wakes a reconnect backoff sleep at disposal.
    abort: Notify,
    disposed: AtomicBool,
    watchdog: Watchdog,
    watchdog_started: AtomicBool,
    /// Runs reconnect attempts off the watchdog's own task.
    reconnect: ActionChannel,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    scheduler: Scheduler,
}

impl Connection {
    /// Validate the config and wire up the whole pipeline. Nothing runs
    /// until [`init`](Connection::init) and [`connect`](Connection::connect).
    pub fn new(config: BotConfig, plugins: Vec<Plugin>) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let events = EventSink::new();
        let transport: SharedTransport = Arc::new(tokio::sync::Mutex::new(None));
        let writer_queue = WriterQueue::new();
        let writer = writer_queue.writer(transport.clone(), config.clone(), events.clone());
        let dispatch = DispatchQueue::new(config.clone(), writer.clone(), plugins);

        let dispatch_handle = dispatch.handle();
        events.bind(move |line| dispatch_handle.parse_and_run(&line));

        let watchdog = Watchdog::new(config.watchdog_timeout());
        let inner = Arc::new(ConnInner {
            config,
            state: Mutex::new(ConnectionState::Uninitialized),
            transport,
            writer_queue,
            writer,
            dispatch,
            events,
            keep_reading: AtomicBool::new(false),
            abort: Notify::new(),
            disposed: AtomicBool::new(false),
            watchdog,
            watchdog_started: AtomicBool::new(false),
            reconnect: ActionChannel::new("reconnect"),
            reader_task: Mutex::new(None),
            scheduler: Scheduler::new(),
        });
        Ok(Self { inner })
    }

    /// Start the worker tasks (writer queue, dispatch queue, reconnect
    /// executor). Idempotent.
    pub fn init(&self) {
        let mut state = self.inner.state.lock();
        if *state == ConnectionState::Uninitialized {
            self.inner.writer_queue.start();
            self.inner.dispatch.start();
            self.inner.reconnect.start();
            *state = ConnectionState::Initialized;
        }
    }

    /// Open the transport, run the registration handshake, join the
    /// configured channels, and start the watchdog (first connect only).
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        connect_inner(&self.inner).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn writer(&self) -> IrcWriter {
        self.inner.writer.clone()
    }

    /// The factory handed to plugin init for inter-plugin events.
    pub fn bus_factory(&self) -> BusFactory {
        BusFactory::new(self.inner.events.clone())
    }

    // Scheduler contract.

    pub fn schedule_recurring(
        &self,
        interval: Duration,
        action: impl Fn() + Send + Sync + 'static,
    ) -> EventId {
        self.inner.scheduler.schedule_recurring(interval, action)
    }

    pub fn start_event(&self, id: EventId) {
        self.inner.scheduler.start_event(id);
    }

    pub fn stop_event(&self, id: EventId) {
        self.inner.scheduler.stop_event(id);
    }

    pub fn dispose_event(&self, id: EventId) {
        self.inner.scheduler.dispose_event(id);
    }

    /// Tear everything down. The order here is deliberate and must not
    /// change: scheduler, reader flag, reconnect abort, writer drain,
    /// disconnect, watchdog, dispatch. Idempotent.
    pub async fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.scheduler.dispose_all();
        let was_connected = *inner.state.lock() == ConnectionState::Connected;
        if was_connected {
            inner.keep_reading.store(false, Ordering::Release);
            inner
                .writer
                .enqueue_unaudited(format!("QUIT :{}", inner.config.quit_message));
        }
        inner.abort.notify_one();
        inner.writer_queue.close_and_drain().await;
        disconnect_helper(inner).await;
        inner.watchdog.dispose();
        inner.reconnect.abort();
        inner.dispatch.close_and_drain().await;
        *inner.state.lock() = ConnectionState::Disposed;
    }

    #[cfg(test)]
    pub(crate) fn trigger_reconnect(&self) {
        let inner = self.inner.clone();
        self.inner.reconnect.begin_invoke(async move {
            reconnect_loop(inner).await;
            Ok(())
        });
    }
}

async fn connect_inner(inner: &Arc<ConnInner>) -> Result<(), ConnectionError> {
    {
        let state = inner.state.lock();
        match *state {
            ConnectionState::Uninitialized => return Err(StateError::NotInitialized.into()),
            ConnectionState::Connected => return Err(StateError::AlreadyConnected.into()),
            ConnectionState::Disposed => return Err(StateError::Disposed.into()),
            ConnectionState::Initialized
            | ConnectionState::Disconnected
            | ConnectionState::Reconnecting => {}
        }
    }

    let config = &inner.config;
    let (reader, write_half) = transport::connect(config).await?;
    *inner.transport.lock().await = Some(write_half);
    inner.keep_reading.store(true, Ordering::Release);

    let reader_inner = inner.clone();
    *inner.reader_task.lock() = Some(tokio::spawn(read_loop(reader_inner, reader)));

    if let Some(pass) = &config.server_password {
        inner.writer.enqueue_unaudited(format!("PASS {pass}"));
    }
    inner.writer.enqueue_unaudited(format!(
        "USER {} 0 * :{}",
        config.user_name, config.real_name
    ));
    inner.writer.enqueue_unaudited(format!("NICK {}", config.nick));
    if let Some(pass) = &config.nickserv_password {
        inner.writer.enqueue_unaudited(format!(
            "PRIVMSG {} :IDENTIFY {pass}",
            config.nickserv_nick
        ));
        // Give services one rate-limit interval to apply the identify
        // before anything else goes out.
        tokio::time::sleep(config.rate_limit()).await;
    }

    *inner.state.lock() = ConnectionState::Connected;
    inner
        .events
        .emit(core_event(names::CONNECTED, &[("server", config.server.as_str())]));

    for channel in &config.channels {
        inner.writer.send_join(channel);
    }
    if !inner.writer.flush(JOIN_DRAIN_TIMEOUT).await {
        return Err(StateError::JoinTimeout.into());
    }
    inner.events.emit(core_event(names::FINISHED_JOINING, &[]));

    if !inner.watchdog_started.swap(true, Ordering::SeqCst) {
        let weak = Arc::downgrade(inner);
        inner.watchdog.start(inner.writer.clone(), move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.events.emit(core_event(names::WATCHDOG_FAILED, &[]));
            let task_inner = inner.clone();
            inner.reconnect.begin_invoke(async move {
                reconnect_loop(task_inner).await;
                Ok(())
            });
        });
    }
    Ok(())
}

/// Reader task: blocking line reads until told to stop or the socket
/// dies. PING and PONG are resolved inline so liveness survives a
/// stalled dispatch queue; every line (including those) is then handed
/// to the dispatch queue in read order.
async fn read_loop(inner: Arc<ConnInner>, mut reader: TransportReader) {
    let mut ping = PingHandler::pong_responder();
    let pong_inner = inner.clone();
    let mut pong = PongHandler::expecting_token(
        PROBE_TOKEN,
        Box::new(move |_| {
            pong_inner.watchdog.signal_pong();
            Ok(Flow::Continue)
        }),
    );
    let dispatch = inner.dispatch.handle();

    loop {
        if !inner.keep_reading.load(Ordering::Acquire) {
            return;
        }
        match reader.read_line().await {
            Ok(Some(line)) => {
                let args = HandlerArgs {
                    line: line.clone(),
                    config: inner.config.clone(),
                    writer: inner.writer.clone(),
                    blacklist: Vec::new(),
                };
                if let Err(err) = ping.handle(&args) {
                    tracing::warn!(error = %err, "ping fast path failed");
                }
                if let Err(err) = pong.handle(&args) {
                    tracing::warn!(error = %err, "pong fast path failed");
                }
                dispatch.parse_and_run(&line);
            }
            Ok(None) => {
                if inner.keep_reading.load(Ordering::Acquire) {
                    tracing::warn!("server closed the connection");
                }
                return;
            }
            Err(err) => {
                // Intentional shutdown reads as a plain return; anything
                // else is logged and left to the watchdog to recover.
                if inner.keep_reading.load(Ordering::Acquire) {
                    tracing::warn!(error = %err, "read failed");
                }
                return;
            }
        }
    }
}

/// Close the transport under the writer's lock, stop the reader, and
/// mark the connection disconnected.
async fn disconnect_helper(inner: &Arc<ConnInner>) {
    inner.events.emit(core_event(names::DISCONNECTING, &[]));
    inner.keep_reading.store(false, Ordering::Release);
    {
        let mut guard = inner.transport.lock().await;
        if let Some(mut write_half) = guard.take() {
            write_half.shutdown().await;
        }
    }
    let handle = inner.reader_task.lock().take();
    if let Some(handle) = handle {
        handle.abort();
        let _ = handle.await;
    }
    *inner.state.lock() = ConnectionState::Disconnected;
    inner.events.emit(core_event(names::DISCONNECTED, &[]));
}

fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_STEP.saturating_mul(attempt).min(BACKOFF_CAP)
}

/// Disconnect, then keep retrying `connect` with a growing backoff
/// until it succeeds, the abort signal fires, or the connection is
/// disposed.
async fn reconnect_loop(inner: Arc<ConnInner>) {
    if inner.disposed.load(Ordering::Acquire) {
        return;
    }
    disconnect_helper(&inner).await;
    *inner.state.lock() = ConnectionState::Reconnecting;

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let delay = backoff_delay(attempt);
        tracing::info!(attempt, delay_secs = delay.as_secs(), "waiting to reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.abort.notified() => return,
        }
        if inner.disposed.load(Ordering::Acquire) {
            return;
        }
        inner.events.emit(core_event(names::RECONNECTING, &[]));
        match connect_inner(&inner).await {
            Ok(()) => {
                tracing::info!(attempt, "reconnected");
                return;
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "reconnect attempt failed");
                if inner.disposed.load(Ordering::Acquire) {
                    return;
                }
                // A half-open attempt (e.g. join timeout) leaves a
                // transport behind; tear it down before retrying.
                if inner.transport.lock().await.is_some() {
                    disconnect_helper(&inner).await;
                }
                *inner.state.lock() = ConnectionState::Reconnecting;
            }
        }
    }
}
