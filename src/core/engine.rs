//! # Engine: public facade over the engine loop.
//!
//! The [`Engine`] owns the sending side of the loop's inbox, the event [`Bus`] and the
//! watch channels the loop publishes its report and final outcome through. Registered
//! subscribers are fed by a listener task that owns the
//! [`SubscriberSet`](crate::SubscriberSet). Every method is a message or a channel
//! read; none touches records.
//!
//! ## High-level architecture
//! ```text
//! install(name, manifold) ──► Message::Install ──┐
//! kill()                  ──► Message::Kill    ──┤
//!                                                ▼
//!                                     EngineActor::run (one task)
//!                                      │   ▲          │
//!                   spawn_start/watch  │   │ Started  │ publish(Event)
//!                   schedule_retry     ▼   │ Exited   ▼
//!                                    runner tasks    Bus ──► subscriber listener ──► SubscriberSet
//!                                                    │
//! report()  ◄── watch<Report>  ◄─────────────────────┤
//! wait()    ◄── watch<Outcome> ◄── loop exit ────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use depvisor::{Engine, EngineConfig, Manifold, ManifoldState, Resolver, TaskWorker, WorkerRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder(EngineConfig::default()).build();
//!
//!     engine
//!         .install(
//!             "heartbeat",
//!             Manifold::new(|_r: Resolver| async {
//!                 let w: WorkerRef = TaskWorker::spawn(|ctx: CancellationToken| async move {
//!                     ctx.cancelled().await;
//!                     Ok(())
//!                 });
//!                 Ok(w)
//!             }),
//!         )
//!         .await?;
//!
//!     let mut states = engine.watch_report();
//!     states
//!         .wait_for(|r| r.state("heartbeat") == Some(ManifoldState::Running))
//!         .await?;
//!
//!     engine.kill();
//!     engine.wait().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::actor::{Message, Outcome};
use crate::core::builder::EngineBuilder;
use crate::core::config::EngineConfig;
use crate::core::report::Report;
use crate::core::shutdown;
use crate::error::{EngineError, TaskError};
use crate::events::{Bus, Event};
use crate::tasks::{Manifold, Worker};

/// Runs the worker of every installed manifold, restarting workers when they fail
/// and bouncing them when their inputs change, until killed or a fatal error occurs.
///
/// An `Engine` is itself a [`Worker`], so engines can be nested inside manifolds.
pub struct Engine {
    cfg: EngineConfig,
    inbox: mpsc::UnboundedSender<Message>,
    report: watch::Receiver<Report>,
    done: watch::Receiver<Outcome>,
    bus: Bus,
    subscribers: usize,
}

impl Engine {
    /// Creates a builder for an engine with the given configuration.
    pub fn builder(cfg: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(cfg)
    }

    /// Starts an engine with the given configuration and no subscribers.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(cfg: EngineConfig) -> Arc<Self> {
        Self::builder(cfg).build()
    }

    pub(crate) fn new_internal(
        cfg: EngineConfig,
        inbox: mpsc::UnboundedSender<Message>,
        report: watch::Receiver<Report>,
        done: watch::Receiver<Outcome>,
        bus: Bus,
        subscribers: usize,
    ) -> Self {
        Self {
            cfg,
            inbox,
            report,
            done,
            bus,
            subscribers,
        }
    }

    /// Installs `manifold` under `name` and schedules an immediate start attempt.
    ///
    /// Inputs may name manifolds that are not installed yet. Installing a manifold
    /// notifies every installed manifold that lists it as an input.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateName`] if `name` is taken (the existing worker is untouched);
    /// - [`EngineError::ShuttingDown`] once shutdown began.
    pub async fn install(
        &self,
        name: impl Into<String>,
        manifold: Manifold,
    ) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Message::Install {
                name: name.into(),
                manifold,
                reply,
            })
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    /// Requests shutdown of every worker; idempotent and non-blocking.
    ///
    /// Dependents are asked to stop before their dependencies.
    pub fn kill(&self) {
        let _ = self.inbox.send(Message::Kill);
    }

    /// Waits until every worker has stopped after [`Engine::kill`] or a fatal error.
    ///
    /// Returns the first fatal error, or `Ok(())` for a clean kill.
    pub async fn wait(&self) -> Result<(), TaskError> {
        let mut done = self.done.clone();
        match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            // The loop task is gone without publishing an outcome (panic or runtime shutdown).
            Err(_) => Err(TaskError::fail("engine loop terminated")),
        }
    }

    /// True once the engine loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Latest diagnostic snapshot; non-blocking and eventually consistent.
    ///
    /// [`Report::stalled`] is evaluated at call time.
    pub fn report(&self) -> Report {
        let mut report = self.report.borrow().clone();
        report.mark_stalled(Instant::now(), self.cfg.stall_threshold);
        report
    }

    /// Receiver of every report the loop publishes, for waiting on a condition.
    pub fn watch_report(&self) -> watch::Receiver<Report> {
        self.report.clone()
    }

    /// Raw receiver of subsequent engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Number of subscribers fed by this engine.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
    }

    /// Waits for the engine to stop, or for an OS termination signal.
    ///
    /// On a signal the engine is killed first and then awaited. If signal handlers
    /// cannot be installed, this behaves like [`Engine::wait`].
    pub async fn wait_or_signal(&self) -> Result<(), TaskError> {
        self.wait_or_kill_on(shutdown::termination_signal()).await
    }

    /// Waits for the engine, killing it once `trigger` yields `Ok`.
    ///
    /// A failed trigger is logged and ignored.
    pub(crate) async fn wait_or_kill_on<F>(&self, trigger: F) -> Result<(), TaskError>
    where
        F: Future<Output = std::io::Result<&'static str>>,
    {
        tokio::select! {
            res = self.wait() => return res,
            sig = trigger => match sig {
                Ok(signal) => {
                    info!(signal, "termination signal received, killing engine");
                    self.kill();
                }
                Err(err) => warn!(error = %err, "signal handlers unavailable, waiting without them"),
            }
        }
        self.wait().await
    }
}

#[async_trait]
impl Worker for Engine {
    fn kill(&self) {
        Engine::kill(self);
    }

    async fn wait(&self) -> Result<(), TaskError> {
        Engine::wait(self).await
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.kill();
    }
}
