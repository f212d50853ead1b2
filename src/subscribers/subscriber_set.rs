//! # Fan-out of engine events to registered subscribers.
//!
//! The builder hands the [`SubscriberSet`] to a listener task that forwards every bus
//! event until `EngineStopped`, then calls [`SubscriberSet::drain`] so each subscriber
//! sees the final event before the listener exits.
//!
//! ```text
//! Bus ──► listener ──► emit(ev) ──┬─► queue ──► driver ──► LogWriter::on_event
//!                                 └─► queue ──► driver ──► custom::on_event
//!            EngineStopped ──► drain(): close queues, join drivers
//! ```
//!
//! Each subscriber has its own bounded queue and driver task, so it sees events in
//! publish order and cannot hold up the engine loop or its peers. When a queue is full
//! the event is dropped for that subscriber only and a `SubscriberOverflow` naming the
//! dropped kind goes back on the bus. A panic inside `on_event` becomes a
//! `SubscriberPanicked` event and the driver moves on to the next event.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;
use crate::tasks::panic_message;

struct Queue {
    subscriber: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Bounded per-subscriber delivery of engine events.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    drivers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one driver per subscriber; queue sizes come from
    /// [`Subscribe::queue_capacity`] (at least 1).
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (queues, drivers) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let queue = Queue {
                    subscriber: sub.name(),
                    tx,
                };
                (queue, tokio::spawn(drive(sub, rx, bus.clone())))
            })
            .unzip();
        Self {
            queues,
            drivers,
            bus,
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queues `event` for every subscriber without waiting.
    ///
    /// Overflow notices are never reported as overflowing themselves.
    pub fn emit(&self, event: Event) {
        let kind = event.kind;
        let event = Arc::new(event);
        for queue in &self.queues {
            let Err(err) = queue.tx.try_send(Arc::clone(&event)) else {
                continue;
            };
            if kind == EventKind::SubscriberOverflow {
                continue;
            }
            let cause = match err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "driver gone",
            };
            self.bus.publish(Event::subscriber_overflow(
                queue.subscriber,
                format!("{cause}, dropped {}", kind.as_label()),
            ));
        }
    }

    /// Closes every queue and waits until each driver has handled what was queued.
    pub async fn drain(self) {
        drop(self.queues);
        for driver in self.drivers {
            let _ = driver.await;
        }
    }
}

async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(panic) = handled {
            bus.publish(Event::subscriber_panicked(
                sub.name(),
                panic_message(panic.as_ref()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().expect("lock").push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber blew up");
        }
        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    /// Blocks on its first event until released; queue of one.
    struct Stuck(Notify);

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _ev: &Event) {
            self.0.notified().await;
        }
        fn name(&self) -> &'static str {
            "stuck"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_isolates_panics() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![rec.clone(), Arc::new(Panicky)], bus);
        assert_eq!(set.len(), 2);

        set.emit(Event::new(EventKind::ManifoldInstalled));
        set.emit(Event::new(EventKind::ManifoldStarted));
        set.drain().await;

        assert_eq!(
            *rec.0.lock().expect("lock"),
            vec![EventKind::ManifoldInstalled, EventKind::ManifoldStarted]
        );
        let ev = rx.recv().await.expect("panic event");
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.manifold.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber blew up"));
    }

    #[tokio::test]
    async fn full_queue_reports_the_dropped_kind() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let stuck = Arc::new(Stuck(Notify::new()));
        let set = SubscriberSet::new(vec![stuck.clone()], bus);

        set.emit(Event::new(EventKind::ManifoldStarted));
        // Let the driver take the first event and park on it.
        tokio::task::yield_now().await;
        set.emit(Event::new(EventKind::ManifoldExited));
        set.emit(Event::new(EventKind::ManifoldBounced));

        let ev = rx.recv().await.expect("overflow event");
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.manifold.as_deref(), Some("stuck"));
        assert_eq!(ev.reason.as_deref(), Some("queue full, dropped manifold_bounced"));

        stuck.0.notify_one();
        stuck.0.notify_one();
        set.drain().await;
    }
}
