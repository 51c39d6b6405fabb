//! Ordered, single-consumer work queue.
//!
//! An `ActionChannel` is the one serialization primitive in the runtime:
//! callers enqueue boxed async actions with [`ActionChannel::begin_invoke`]
//! (never blocking), and exactly one worker task drains and runs them in
//! strict FIFO order. The writer queue, the dispatch queue, and the
//! reconnect executor are all instances of this type, which is what gives
//! the whole engine its ordering guarantees without a global lock.
//!
//! Per-action errors go to an overridable hook and never stop the worker.
//! Enqueueing onto a closed channel goes to a rejected hook rather than
//! erroring at the call site.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Action = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

enum Item {
    Run(Action),
    /// Enqueued by `close_and_drain`; everything ahead of it still runs.
    Stop,
}

/// Hooks observing the channel's lifecycle. Defaults log via `tracing`.
pub struct Hooks {
    /// An action returned `Err`. Receives the channel name and the error.
    pub on_error: Box<dyn Fn(&str, &anyhow::Error) + Send + Sync>,
    /// An action was enqueued after the channel stopped accepting work.
    pub on_rejected: Box<dyn Fn(&str) + Send + Sync>,
    /// The worker loop ended (drain completed or the worker was aborted).
    pub on_exit: Box<dyn Fn(&str) + Send + Sync>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            on_error: Box::new(|name, err| {
                tracing::error!(channel = name, error = %err, "action failed");
            }),
            on_rejected: Box::new(|name| {
                tracing::warn!(channel = name, "action enqueued on closed channel, dropped");
            }),
            on_exit: Box::new(|name| {
                tracing::debug!(channel = name, "worker exited");
            }),
        }
    }
}

/// Cheap handle for enqueueing onto an [`ActionChannel`].
#[derive(Clone)]
pub struct ActionSender {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Item>,
    closed: Arc<AtomicBool>,
    hooks: Arc<Hooks>,
}

impl ActionSender {
    /// Enqueue an action. Returns immediately; never blocks the caller.
    ///
    /// If the channel has been closed the action is dropped and the
    /// rejected hook fires.
    pub fn begin_invoke<F>(&self, action: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            (self.hooks.on_rejected)(&self.name);
            return;
        }
        if self.tx.send(Item::Run(Box::pin(action))).is_err() {
            (self.hooks.on_rejected)(&self.name);
        }
    }
}

/// The owning side of the queue: start, drain, abort.
pub struct ActionChannel {
    name: Arc<str>,
    sender: ActionSender,
    // Taken by start(); present only before the worker exists.
    rx: Mutex<Option<mpsc::UnboundedReceiver<Item>>>,
    tx: mpsc::UnboundedSender<Item>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    hooks: Arc<Hooks>,
}

impl ActionChannel {
    pub fn new(name: &str) -> Self {
        Self::with_hooks(name, Hooks::default())
    }

    pub fn with_hooks(name: &str, hooks: Hooks) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let name: Arc<str> = Arc::from(name);
        let closed = Arc::new(AtomicBool::new(false));
        let hooks = Arc::new(hooks);
        let sender = ActionSender {
            name: name.clone(),
            tx: tx.clone(),
            closed: closed.clone(),
            hooks: hooks.clone(),
        };
        Self {
            name,
            sender,
            rx: Mutex::new(Some(rx)),
            tx,
            worker: Mutex::new(None),
            closed,
            hooks,
        }
    }

    /// Spin up the single worker task. Calling again is a no-op.
    pub fn start(&self) {
        let Some(mut rx) = self.rx.lock().take() else {
            return;
        };
        let name = self.name.clone();
        let hooks = self.hooks.clone();
        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    Item::Run(action) => {
                        if let Err(err) = action.await {
                            (hooks.on_error)(&name, &err);
                        }
                    }
                    Item::Stop => break,
                }
            }
            (hooks.on_exit)(&name);
        });
        *self.worker.lock() = Some(handle);
    }

    pub fn sender(&self) -> ActionSender {
        self.sender.clone()
    }

    /// See [`ActionSender::begin_invoke`].
    pub fn begin_invoke<F>(&self, action: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.sender.begin_invoke(action);
    }

    /// Graceful shutdown: stop accepting work, let everything already
    /// queued run, then join the worker. Idempotent.
    pub async fn close_and_drain(&self) {
        self.closed.store(true, Ordering::Release);
        // The stop marker sits behind every queued action, so the
        // worker finishes them all before breaking out of its loop.
        let _ = self.tx.send(Item::Stop);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Immediate cancel: queued actions are discarded. Idempotent.
    pub fn abort(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}
