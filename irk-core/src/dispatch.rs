//! Event dispatch queue.
//!
//! Every raw line the reader produces is fanned out to each plugin's
//! ordered handler list. Each handler invocation is enqueued onto the
//! dispatch [`ActionChannel`] individually, so the system-wide FIFO
//! order is preserved while one slow or failing handler cannot take its
//! siblings down with it: a callback error is wrapped as a
//! [`HandlerFault`] carrying the plugin name and the offending line,
//! routed to the channel's error hook, and the worker moves on.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::action_channel::{ActionChannel, ActionSender};
use crate::config::BotConfig;
use crate::error::HandlerFault;
use crate::handlers::{Flow, Handler, HandlerArgs};
use crate::writer::IrcWriter;

/// A plugin as the dispatch queue sees it: a name, the channels it must
/// ignore, and its ordered handler list.
pub struct Plugin {
    pub name: String,
    pub blacklist: Vec<String>,
    pub handlers: Vec<Handler>,
}

impl Plugin {
    pub fn new(name: impl Into<String>, handlers: Vec<Handler>) -> Self {
        Self {
            name: name.into(),
            blacklist: Vec::new(),
            handlers,
        }
    }

    pub fn with_blacklist(mut self, blacklist: Vec<String>) -> Self {
        self.blacklist = blacklist;
        self
    }
}

struct RegisteredHandler {
    id: u64,
    handler: Handler,
}

struct PluginSlot {
    name: String,
    blacklist: Vec<String>,
    handlers: Mutex<Vec<RegisteredHandler>>,
}

/// Owner of the dispatch worker.
pub struct DispatchQueue {
    chan: ActionChannel,
    handle: DispatchHandle,
}

impl DispatchQueue {
    pub fn new(config: Arc<BotConfig>, writer: IrcWriter, plugins: Vec<Plugin>) -> Self {
        let chan = ActionChannel::new("dispatch");
        let mut next_id = 0u64;
        let slots: Vec<Arc<PluginSlot>> = plugins
            .into_iter()
            .map(|plugin| {
                let handlers = plugin
                    .handlers
                    .into_iter()
                    .map(|handler| {
                        next_id += 1;
                        RegisteredHandler {
                            id: next_id,
                            handler,
                        }
                    })
                    .collect();
                Arc::new(PluginSlot {
                    name: plugin.name,
                    blacklist: plugin.blacklist,
                    handlers: Mutex::new(handlers),
                })
            })
            .collect();
        let handle = DispatchHandle {
            sender: chan.sender(),
            plugins: Arc::new(slots),
            config,
            writer,
        };
        Self { chan, handle }
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

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }
}

/// Cheap handle for feeding lines into the queue.
#[derive(Clone)]
pub struct DispatchHandle {
    sender: ActionSender,
    plugins: Arc<Vec<Arc<PluginSlot>>>,
    config: Arc<BotConfig>,
    writer: IrcWriter,
}

impl DispatchHandle {
    /// Fan one raw line out to every plugin's handlers.
    ///
    /// Enqueue-only; the invocations themselves run on the dispatch
    /// worker. Calling this from a single task preserves line order
    /// across all plugins.
    pub fn parse_and_run(&self, line: &str) {
        let base = HandlerArgs {
            line: line.to_string(),
            config: self.config.clone(),
            writer: self.writer.clone(),
            blacklist: Vec::new(),
        };
        for slot in self.plugins.iter() {
            // One envelope clone per plugin: the blacklist differs.
            let args = base.with_blacklist(slot.blacklist.clone());
            let ids: Vec<u64> = slot.handlers.lock().iter().map(|r| r.id).collect();
            for id in ids {
                let slot = slot.clone();
                let args = args.clone();
                self.sender
                    .begin_invoke(async move { run_one(&slot, id, &args) });
            }
        }
    }
}

fn run_one(slot: &PluginSlot, id: u64, args: &HandlerArgs) -> anyhow::Result<()> {
    let mut handlers = slot.handlers.lock();
    // Deregistered by an earlier invocation: nothing to do.
    let Some(pos) = handlers.iter().position(|r| r.id == id) else {
        return Ok(());
    };
    let registered = &mut handlers[pos];
    match registered.handler.handle(args) {
        Ok(Flow::Continue) => Ok(()),
        Ok(Flow::Deregister) => {
            handlers.remove(pos);
            Ok(())
        }
        Err(source) => {
            let fault = HandlerFault {
                plugin: slot.name.clone(),
                handler_kind: registered.handler.kind(),
                line: args.line.clone(),
                source,
            };
            Err(fault.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{AllHandler, MessageHandler, MessageHandlerConfig};
    use crate::testutil::test_args;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn queue_with(plugins: Vec<Plugin>) -> DispatchQueue {
        let args = test_args(crate::testutil::test_config(), Vec::new());
        let queue = DispatchQueue::new(args.config.clone(), args.writer.clone(), plugins);
        queue.start();
        queue
    }

    fn message_plugin(
        name: &str,
        blacklist: Vec<String>,
        count: Arc<AtomicUsize>,
    ) -> Plugin {
        let handler = MessageHandler::new(MessageHandlerConfig::new(
            ".*",
            Box::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue)
            }),
        ))
        .unwrap();
        Plugin::new(name, vec![handler.into()]).with_blacklist(blacklist)
    }

    #[tokio::test]
    async fn blacklist_is_per_plugin() {
        let hits_a = Arc::new(AtomicUsize::new(0));
        let hits_b = Arc::new(AtomicUsize::new(0));
        let queue = queue_with(vec![
            message_plugin("a", vec!["#chan".to_string()], hits_a.clone()),
            message_plugin("b", Vec::new(), hits_b.clone()),
        ]);
        queue
            .handle()
            .parse_and_run(":nick!u@h PRIVMSG #chan :hello");
        queue.close_and_drain().await;
        assert_eq!(hits_a.load(Ordering::SeqCst), 0);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_error_does_not_stop_siblings() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cb_hits = hits.clone();
        let failing = AllHandler::new(Box::new(|_| anyhow::bail!("plugin bug")));
        let counting = AllHandler::new(Box::new(move |_| {
            cb_hits.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }));
        let queue = queue_with(vec![Plugin::new(
            "fragile",
            vec![failing.into(), counting.into()],
        )]);
        queue.handle().parse_and_run("PING :x");
        queue.handle().parse_and_run("PING :y");
        queue.close_and_drain().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deregistered_handler_never_fires_again() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cb_hits = hits.clone();
        let one_shot = AllHandler::new(Box::new(move |_| {
            cb_hits.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Deregister)
        }));
        let queue = queue_with(vec![Plugin::new("oneshot", vec![one_shot.into()])]);
        let handle = queue.handle();
        handle.parse_and_run("PING :1");
        handle.parse_and_run("PING :2");
        handle.parse_and_run("PING :3");
        queue.close_and_drain().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lines_dispatch_in_read_order_across_plugins() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mk = |tag: &'static str, seen: Arc<parking_lot::Mutex<Vec<String>>>| {
            AllHandler::new(Box::new(move |args| {
                seen.lock().push(format!("{tag}:{}", args.line));
                Ok(Flow::Continue)
            }))
        };
        let queue = queue_with(vec![
            Plugin::new("first", vec![mk("first", seen.clone()).into()]),
            Plugin::new("second", vec![mk("second", seen.clone()).into()]),
        ]);
        let handle = queue.handle();
        handle.parse_and_run("one");
        handle.parse_and_run("two");
        queue.close_and_drain().await;
        assert_eq!(
            *seen.lock(),
            vec![
                "first:one".to_string(),
                "second:one".to_string(),
                "first:two".to_string(),
                "second:two".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn slow_handler_delays_but_does_not_reorder() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let slow_seen = seen.clone();
        let slow = AllHandler::new(Box::new(move |args| {
            std::thread::sleep(Duration::from_millis(10));
            slow_seen.lock().push(args.line.clone());
            Ok(Flow::Continue)
        }));
        let fast_seen = seen.clone();
        let fast = AllHandler::new(Box::new(move |args| {
            fast_seen.lock().push(format!("fast:{}", args.line));
            Ok(Flow::Continue)
        }));
        let queue = queue_with(vec![
            Plugin::new("slow", vec![slow.into()]),
            Plugin::new("fast", vec![fast.into()]),
        ]);
        queue.handle().parse_and_run("line");
        queue.close_and_drain().await;
        assert_eq!(*seen.lock(), vec!["line".to_string(), "fast:line".to_string()]);
    }
}
