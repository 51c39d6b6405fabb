//! Connection liveness prober.
//!
//! Every `timeout` the watchdog sends a `PING` carrying
//! [`PROBE_TOKEN`]; the reader recognizes the echoed token in the
//! server's PONG and calls [`Watchdog::signal_pong`]. One missed window
//! earns a retry; a second miss fires the failure callback, which is
//! how the reconnect state machine learns the socket has gone quiet.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::writer::IrcWriter;

/// Payload of the watchdog's PING probes.
pub const PROBE_TOKEN: &str = "irk-watchdog";

pub struct Watchdog {
    timeout: Duration,
    pong: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pong: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    /// Start probing. Called once, on the very first connect.
    pub fn start(&self, writer: IrcWriter, on_failure: impl Fn() + Send + Sync + 'static) {
        let timeout = self.timeout;
        let pong = self.pong.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(timeout).await;
                let mut answered = false;
                for attempt in 0u32..2 {
                    writer.send_ping(PROBE_TOKEN);
                    tokio::select! {
                        _ = pong.notified() => {
                            answered = true;
                            break;
                        }
                        _ = tokio::time::sleep(timeout) => {
                            tracing::debug!(attempt, "watchdog probe unanswered");
                        }
                    }
                }
                if !answered {
                    tracing::warn!("watchdog gave up waiting for PONG");
                    on_failure();
                }
            }
        });
        *self.task.lock() = Some(handle);
    }

    /// Reset the timer: the probe came back.
    pub fn signal_pong(&self) {
        self.pong.notify_one();
    }

    pub fn dispose(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.dispose();
    }
}
