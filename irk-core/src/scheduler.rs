//! Recurring timed actions for plugins.
//!
//! The scheduler contract: schedule an action at a fixed interval, get
//! back an id, start/stop/dispose it by that id. Events start enabled;
//! a stopped event keeps its task but skips firing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub type EventId = u64;

struct ScheduledEvent {
    enabled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerInner {
    next_id: EventId,
    events: HashMap<EventId, ScheduledEvent>,
}

#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` every `interval` until the event is disposed.
    /// The first firing happens one interval from now.
    pub fn schedule_recurring(
        &self,
        interval: Duration,
        action: impl Fn() + Send + Sync + 'static,
    ) -> EventId {
        let enabled = Arc::new(AtomicBool::new(true));
        let task_enabled = enabled.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval() fires immediately on the first tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if task_enabled.load(Ordering::Acquire) {
                    action();
                }
            }
        });

        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.events.insert(id, ScheduledEvent { enabled, task });
        id
    }

    pub fn start_event(&self, id: EventId) {
        if let Some(event) = self.inner.lock().events.get(&id) {
            event.enabled.store(true, Ordering::Release);
        }
    }

    pub fn stop_event(&self, id: EventId) {
        if let Some(event) = self.inner.lock().events.get(&id) {
            event.enabled.store(false, Ordering::Release);
        }
    }

    pub fn dispose_event(&self, id: EventId) {
        if let Some(event) = self.inner.lock().events.remove(&id) {
            event.task.abort();
        }
    }

    pub fn dispose_all(&self) {
        for (_, event) in self.inner.lock().events.drain() {
            event.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn fires_repeatedly_on_interval() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let cb = fired.clone();
        scheduler.schedule_recurring(Duration::from_secs(5), move || {
            cb.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_start_gate_firing() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let cb = fired.clone();
        let id = scheduler.schedule_recurring(Duration::from_secs(1), move || {
            cb.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let after_run = fired.load(Ordering::SeqCst);
        assert_eq!(after_run, 3);

        scheduler.stop_event(id);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_run);

        scheduler.start_event(id);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst) > after_run);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_removes_event() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let cb = fired.clone();
        let id = scheduler.schedule_recurring(Duration::from_secs(1), move || {
            cb.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.dispose_event(id);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // Start on a disposed id is a no-op.
        scheduler.start_event(id);
    }
}
