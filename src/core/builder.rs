use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use super::actor::{ActorOutputs, EngineActor};
use super::engine::Engine;
use crate::{
    core::EngineConfig,
    core::Report,
    events::{Bus, EventKind},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing an [`Engine`] with optional subscribers.
pub struct EngineBuilder {
    cfg: EngineConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive engine events (starts, exits, bounces, failures)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine and spawns its loop.
    ///
    /// This consumes the builder and initializes:
    /// - the event bus and the subscriber listener feeding the [`SubscriberSet`]
    /// - the engine loop, with its inbox and report/outcome channels
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Arc<Engine> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subscribers = self.subscribers.len();
        if subscribers > 0 {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, set);
        }

        let (inbox, rx) = mpsc::unbounded_channel();
        let (report_tx, report) = watch::channel(Report::default());
        let (done_tx, done) = watch::channel(None);

        let actor = EngineActor::new(
            self.cfg.clone(),
            inbox.clone(),
            ActorOutputs {
                bus: bus.clone(),
                report: report_tx,
                done: done_tx,
            },
        );
        tokio::spawn(actor.run(rx));

        Arc::new(Engine::new_internal(
            self.cfg,
            inbox,
            report,
            done,
            bus,
            subscribers,
        ))
    }
}

/// Forwards bus events to the subscriber set until the engine has stopped, then
/// drains it so every subscriber handles `EngineStopped`.
fn subscriber_listener(bus: &Bus, set: SubscriberSet) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let stopped = ev.kind == EventKind::EngineStopped;
                    set.emit(ev);
                    if stopped {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        set.drain().await;
    });
}
