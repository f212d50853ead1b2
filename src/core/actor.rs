//! # EngineActor: the single-threaded engine loop.
//!
//! The actor owns the [`Registry`] and is the only code that mutates it. Every state
//! transition happens while handling one [`Message`] from its inbox, so no two
//! transitions race and no lock is ever held across an `.await`.
//!
//! ## Per-record state machine
//! ```text
//!            start()                Started(Ok)
//!   Idle ───────────────► Starting ─────────────► Running
//!    ▲                       │                      │ input changed (bounce)
//!    │   Started(Err)        │                      │ or shutdown
//!    ├───────────────────────┘                      ▼
//!    │                 Exited                    Stopping
//!    └──────────────────────────────────────────────┘
//! ```
//!
//! ## Exit classification (`settle`)
//! ```text
//! Ok / Canceled        → Idle; restart after bounce_delay only if a bounce is pending
//! is_fatal(err)        → fatal_error (first wins), shutdown
//! UnmetDependencies    → Idle until an input changes
//! other                → Idle, restart after error_backoff.delay_for(failures)
//! ```
//! A live worker changing (start or exit) bumps `generation` and queues a
//! dependency change for each dependent. Changes are drained after every message:
//! an idle dependent whose inputs are all installed is started, a running one is
//! bounced, a starting/stopping one gets a single coalesced pending restart.
//! Installing a manifold only queues a change for its idle dependents; active ones
//! are reached when the new manifold's worker starts.
//!
//! ## Shutdown
//! Once shutting down, no start is attempted and pending restarts are dropped. After
//! every message the actor stops each running record none of whose dependents is still
//! active. If nothing can make progress that way (a cycle), every running record is
//! stopped at once. The loop exits when all records are idle.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::config::EngineConfig;
use crate::core::registry::Registry;
use crate::core::report::{ManifoldState, Report};
use crate::core::runner;
use crate::error::{EngineError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Manifold, WorkerRef};

/// Final outcome published when the loop exits.
pub(crate) type Outcome = Option<Result<(), TaskError>>;

/// Inbox of the engine loop.
pub(crate) enum Message {
    Install {
        name: String,
        manifold: Manifold,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Started {
        name: String,
        ticket: u64,
        result: Result<WorkerRef, TaskError>,
    },
    Exited {
        name: String,
        ticket: u64,
        result: Result<(), TaskError>,
    },
    RetryDue {
        name: String,
        retry: u64,
    },
    Kill,
}

/// Channels the actor publishes through.
pub(crate) struct ActorOutputs {
    pub(crate) bus: Bus,
    pub(crate) report: watch::Sender<Report>,
    pub(crate) done: watch::Sender<Outcome>,
}

pub(crate) struct EngineActor {
    cfg: EngineConfig,
    registry: Registry,
    inbox: mpsc::UnboundedSender<Message>,
    out: ActorOutputs,

    /// Queued dependency changes: (dependent, changed input).
    changed: VecDeque<(String, String)>,
    shutting_down: bool,
    fatal_error: Option<TaskError>,
    next_retry: u64,
}

impl EngineActor {
    pub(crate) fn new(
        cfg: EngineConfig,
        inbox: mpsc::UnboundedSender<Message>,
        out: ActorOutputs,
    ) -> Self {
        Self {
            cfg,
            registry: Registry::new(),
            inbox,
            out,
            changed: VecDeque::new(),
            shutting_down: false,
            fatal_error: None,
            next_retry: 0,
        }
    }

    /// Consumes messages until shutdown has stopped every worker.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
            if self.is_finished() {
                break;
            }
        }
        rx.close();
        self.finish();
    }

    /// Handles one message, then drains dependency changes and advances shutdown.
    pub(crate) fn handle(&mut self, msg: Message) {
        match msg {
            Message::Install {
                name,
                manifold,
                reply,
            } => {
                let res = self.install(&name, manifold);
                let _ = reply.send(res);
            }
            Message::Started {
                name,
                ticket,
                result,
            } => self.on_started(&name, ticket, result),
            Message::Exited {
                name,
                ticket,
                result,
            } => self.on_exited(&name, ticket, result),
            Message::RetryDue { name, retry } => self.on_retry_due(&name, retry),
            Message::Kill => self.kill(),
        }

        self.drain_changes();
        if self.shutting_down {
            self.advance_shutdown();
        }
        self.publish_report();
    }

    fn is_finished(&self) -> bool {
        self.shutting_down && self.registry.all_idle()
    }

    fn install(&mut self, name: &str, manifold: Manifold) -> Result<(), EngineError> {
        if self.shutting_down {
            return Err(EngineError::ShuttingDown);
        }
        self.registry.install(name, manifold)?;
        debug!(manifold = name, "manifold installed");
        self.publish(Event::new(EventKind::ManifoldInstalled).with_manifold(name));

        self.start(name);
        // Active dependents hear about this input once its worker starts.
        for dependent in self.registry.dependents(name) {
            let idle = self
                .registry
                .get(&dependent)
                .is_some_and(|rec| rec.state == ManifoldState::Idle);
            if idle {
                self.changed.push_back((dependent, name.to_string()));
            }
        }
        Ok(())
    }

    /// Invokes the start routine of an idle record with a fresh resolver.
    fn start(&mut self, name: &str) {
        if self.shutting_down {
            return;
        }
        let Some(resolver) = self.registry.resolver_for(name) else {
            return;
        };
        let Some(rec) = self.registry.get_mut(name) else {
            return;
        };
        if rec.state.is_active() {
            return;
        }

        rec.state = ManifoldState::Starting;
        rec.ticket += 1;
        rec.start_attempts += 1;
        rec.retry = None;
        rec.restart_pending = false;
        let (ticket, attempt, manifold) = (rec.ticket, rec.start_attempts, rec.manifold.clone());

        debug!(manifold = name, attempt, "starting");
        self.publish(
            Event::new(EventKind::StartAttempted)
                .with_manifold(name)
                .with_attempt(attempt),
        );
        runner::spawn_start(self.inbox.clone(), name.to_string(), ticket, manifold, resolver);
    }

    fn on_started(&mut self, name: &str, ticket: u64, result: Result<WorkerRef, TaskError>) {
        let shutting_down = self.shutting_down;
        let current = self
            .registry
            .get_mut(name)
            .filter(|rec| rec.state == ManifoldState::Starting && rec.ticket == ticket);
        let Some(rec) = current else {
            if let Ok(worker) = result {
                worker.kill();
            }
            return;
        };

        let worker = match result {
            Ok(worker) => worker,
            Err(err) => {
                // No worker was ever live: generation and dependents are untouched.
                rec.state = ManifoldState::Idle;
                self.settle(name, Err(err));
                return;
            }
        };

        rec.worker = Some(worker.clone());
        rec.generation += 1;
        rec.failures = 0;
        rec.unmet_since = None;
        let bounce = rec.restart_pending;
        rec.state = if shutting_down || bounce {
            worker.kill();
            ManifoldState::Stopping
        } else {
            ManifoldState::Running
        };
        let (attempt, generation) = (rec.start_attempts, rec.generation);

        runner::spawn_watch(self.inbox.clone(), name.to_string(), ticket, worker);
        debug!(manifold = name, attempt, generation, "manifold started");
        self.publish(
            Event::new(EventKind::ManifoldStarted)
                .with_manifold(name)
                .with_attempt(attempt)
                .with_generation(generation),
        );
        if shutting_down {
            self.publish(Event::new(EventKind::StopRequested).with_manifold(name));
        } else if bounce {
            self.publish(
                Event::new(EventKind::ManifoldBounced)
                    .with_manifold(name)
                    .with_reason("input changed while starting"),
            );
        }
        self.notify_dependents(name);
    }

    fn on_exited(&mut self, name: &str, ticket: u64, result: Result<(), TaskError>) {
        let Some(rec) = self.registry.get_mut(name) else {
            return;
        };
        if rec.ticket != ticket || rec.worker.is_none() {
            return;
        }

        rec.worker = None;
        rec.state = ManifoldState::Idle;
        rec.generation += 1;
        let generation = rec.generation;

        let mut ev = Event::new(EventKind::ManifoldExited)
            .with_manifold(name)
            .with_generation(generation);
        if let Err(err) = &result {
            ev = ev.with_reason(err.to_string());
        }
        debug!(manifold = name, generation, result = ?result, "manifold exited");
        self.publish(ev);

        self.notify_dependents(name);
        self.settle(name, result);
    }

    /// Decides what happens to an idle record after its worker or start routine ended.
    fn settle(&mut self, name: &str, result: Result<(), TaskError>) {
        let err = match result {
            Ok(()) | Err(TaskError::Canceled) => None,
            Err(err) => Some(err),
        };

        let Some(err) = err else {
            let Some(rec) = self.registry.get_mut(name) else {
                return;
            };
            rec.failures = 0;
            rec.unmet_since = None;
            if rec.restart_pending && !self.shutting_down {
                self.schedule_restart(name, self.cfg.bounce_delay, 0, None);
            }
            return;
        };

        if self.cfg.fatal(&err) {
            if let Some(rec) = self.registry.get_mut(name) {
                rec.last_error = Some(err.clone());
            }
            self.fatal(name, err);
            return;
        }

        let shutting_down = self.shutting_down;
        let Some(rec) = self.registry.get_mut(name) else {
            return;
        };

        if err.is_unmet_dependencies() {
            rec.failures = 0;
            rec.unmet_since.get_or_insert_with(Instant::now);
            let pending = rec.restart_pending && !shutting_down;
            debug!(manifold = name, "unmet dependencies");
            self.publish(Event::new(EventKind::UnmetDependencies).with_manifold(name));
            if pending {
                self.schedule_restart(name, self.cfg.bounce_delay, 0, None);
            }
            return;
        }

        rec.last_error = Some(err.clone());
        rec.unmet_since = None;
        if shutting_down {
            return;
        }
        rec.failures = rec.failures.saturating_add(1);
        let failures = rec.failures;
        let delay = self.cfg.error_backoff.delay_for(failures);
        warn!(manifold = name, failures, ?delay, error = %err, "worker failed, restart scheduled");
        self.schedule_restart(name, delay, failures, Some(err.to_string()));
    }

    fn schedule_restart(
        &mut self,
        name: &str,
        delay: std::time::Duration,
        failures: u32,
        reason: Option<String>,
    ) {
        let Some(rec) = self.registry.get_mut(name) else {
            return;
        };
        self.next_retry += 1;
        rec.retry = Some(self.next_retry);
        rec.restart_pending = false;

        let mut ev = Event::new(EventKind::RestartScheduled)
            .with_manifold(name)
            .with_attempt(u64::from(failures))
            .with_delay(delay);
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        self.publish(ev);
        runner::schedule_retry(self.inbox.clone(), name.to_string(), self.next_retry, delay);
    }

    fn on_retry_due(&mut self, name: &str, retry: u64) {
        let due = self
            .registry
            .get(name)
            .is_some_and(|rec| rec.retry == Some(retry) && rec.state == ManifoldState::Idle);
        if due {
            self.start(name);
        }
    }

    fn notify_dependents(&mut self, name: &str) {
        if self.shutting_down {
            return;
        }
        for dependent in self.registry.dependents(name) {
            self.changed.push_back((dependent, name.to_string()));
        }
    }

    fn drain_changes(&mut self) {
        while let Some((name, input)) = self.changed.pop_front() {
            if self.shutting_down {
                self.changed.clear();
                return;
            }
            self.dependency_changed(&name, &input);
        }
    }

    fn dependency_changed(&mut self, name: &str, input: &str) {
        let installed = self.registry.inputs_installed(name);
        let Some(rec) = self.registry.get_mut(name) else {
            return;
        };
        match rec.state {
            ManifoldState::Idle => {
                if installed {
                    self.start(name);
                }
            }
            ManifoldState::Starting | ManifoldState::Stopping => {
                rec.restart_pending = true;
            }
            ManifoldState::Running => {
                rec.restart_pending = true;
                rec.state = ManifoldState::Stopping;
                if let Some(worker) = &rec.worker {
                    worker.kill();
                }
                debug!(manifold = name, input, "bouncing");
                self.publish(
                    Event::new(EventKind::ManifoldBounced)
                        .with_manifold(name)
                        .with_reason(input),
                );
            }
        }
    }

    fn fatal(&mut self, name: &str, err: TaskError) {
        error!(manifold = name, error = %err, "fatal error, shutting down");
        self.publish(
            Event::new(EventKind::FatalError)
                .with_manifold(name)
                .with_reason(err.to_string()),
        );
        if self.fatal_error.is_none() {
            self.fatal_error = Some(err);
        }
        self.begin_shutdown();
    }

    fn kill(&mut self) {
        if self.shutting_down {
            return;
        }
        info!(manifolds = self.registry.len(), "shutdown requested");
        self.publish(Event::new(EventKind::ShutdownRequested));
        self.begin_shutdown();
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.changed.clear();
        for (_, rec) in self.registry.iter_mut() {
            rec.retry = None;
            rec.restart_pending = false;
        }
    }

    /// Stops running records whose dependents are all idle.
    fn advance_shutdown(&mut self) {
        let mut targets = self.registry.stoppable();
        if targets.is_empty()
            && self.registry.in_state(ManifoldState::Starting).is_empty()
            && self.registry.in_state(ManifoldState::Stopping).is_empty()
        {
            targets = self.registry.in_state(ManifoldState::Running);
            if !targets.is_empty() {
                warn!(manifolds = ?targets, "cyclic dependencies, stopping remaining workers together");
            }
        }
        for name in targets {
            self.request_stop(&name);
        }
    }

    fn request_stop(&mut self, name: &str) {
        let Some(rec) = self.registry.get_mut(name) else {
            return;
        };
        if rec.state != ManifoldState::Running {
            return;
        }
        rec.state = ManifoldState::Stopping;
        if let Some(worker) = &rec.worker {
            worker.kill();
        }
        debug!(manifold = name, "stop requested");
        self.publish(Event::new(EventKind::StopRequested).with_manifold(name));
    }

    fn publish_report(&self) {
        let mut report = self.registry.report();
        report.shutting_down = self.shutting_down;
        report.fatal_error = self.fatal_error.clone();
        report.mark_stalled(Instant::now(), self.cfg.stall_threshold);
        self.out.report.send_replace(report);
    }

    fn finish(&mut self) {
        let result = match self.fatal_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        let mut ev = Event::new(EventKind::EngineStopped);
        if let Err(err) = &result {
            ev = ev.with_reason(err.to_string());
        }
        info!(result = ?result, "engine stopped");
        self.publish(ev);
        self.out.done.send_replace(Some(result));
    }

    #[inline]
    fn publish(&self, ev: Event) {
        self.out.bus.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use std::time::Duration;

    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use crate::core::resolver::{Output, Resolver};
    use crate::policies::BackoffPolicy;
    use crate::tasks::TaskWorker;

    struct Harness {
        actor: EngineActor,
        rx: mpsc::UnboundedReceiver<Message>,
        report: watch::Receiver<Report>,
    }

    impl Harness {
        fn new(cfg: EngineConfig) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let (report_tx, report) = watch::channel(Report::default());
            let (done, _) = watch::channel(None);
            let out = ActorOutputs {
                bus: Bus::new(64),
                report: report_tx,
                done,
            };
            Self {
                actor: EngineActor::new(cfg, tx, out),
                rx,
                report,
            }
        }

        fn install(&mut self, name: &str, manifold: Manifold) -> Result<(), EngineError> {
            let (reply, mut got) = oneshot::channel();
            self.actor.handle(Message::Install {
                name: name.into(),
                manifold,
                reply,
            });
            got.try_recv().expect("install reply")
        }

        /// Feeds the next message produced by spawned helpers back into the actor.
        async fn step(&mut self) -> &'static str {
            let msg = self.rx.recv().await.expect("message");
            let label = match &msg {
                Message::Started { .. } => "started",
                Message::Exited { .. } => "exited",
                Message::RetryDue { .. } => "retry",
                Message::Install { .. } => "install",
                Message::Kill => "kill",
            };
            self.actor.handle(msg);
            label
        }

        fn state(&self, name: &str) -> Option<ManifoldState> {
            self.report.borrow().state(name)
        }

        fn worker(&self, name: &str) -> Option<WorkerRef> {
            self.actor.registry.get(name).and_then(|r| r.worker.clone())
        }
    }

    fn parked(attempts: Arc<AtomicU32>) -> Manifold {
        Manifold::new(move |_r: Resolver| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                let w: WorkerRef = TaskWorker::with_resource(42i32, |ctx: CancellationToken| async move {
                    ctx.cancelled().await;
                    Ok(())
                });
                Ok(w)
            }
        })
        .with_output(|w, out: &mut Output| match w.downcast_ref::<TaskWorker<i32>>() {
            Some(w) => out.put(*w.resource()),
            None => false,
        })
    }

    #[tokio::test]
    async fn scripted_start_and_exit_bump_generation() {
        let mut h = Harness::new(EngineConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));
        h.install("a", parked(attempts.clone())).expect("install");
        assert_eq!(h.state("a"), Some(ManifoldState::Starting));

        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("a"), Some(ManifoldState::Running));
        assert_eq!(h.report.borrow().manifold("a").map(|m| m.generation), Some(1));

        h.worker("a").expect("worker").kill();
        assert_eq!(h.step().await, "exited");
        let report = h.report.borrow().clone();
        let a = report.manifold("a").expect("a");
        assert_eq!(a.state, ManifoldState::Idle);
        assert_eq!(a.generation, 2);
        assert_eq!(a.last_error, None);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_exit_is_ignored() {
        let mut h = Harness::new(EngineConfig::default());
        h.install("a", parked(Arc::new(AtomicU32::new(0)))).expect("install");
        h.step().await;

        h.actor.handle(Message::Exited {
            name: "a".into(),
            ticket: 99,
            result: Err(TaskError::fail("old worker")),
        });
        assert_eq!(h.state("a"), Some(ManifoldState::Running));
        assert_eq!(h.report.borrow().manifold("a").map(|m| m.generation), Some(1));
    }

    #[tokio::test]
    async fn running_dependent_is_bounced_once_per_change() {
        let mut h = Harness::new(EngineConfig::default());
        let b_attempts = Arc::new(AtomicU32::new(0));
        h.install("a", parked(Arc::new(AtomicU32::new(0)))).expect("a");
        h.step().await;
        h.install("b", parked(b_attempts.clone()).with_inputs(["a"]))
            .expect("b");
        h.step().await;
        assert_eq!(h.state("b"), Some(ManifoldState::Running));

        h.worker("a").expect("a worker").kill();
        assert_eq!(h.step().await, "exited");
        assert_eq!(h.state("a"), Some(ManifoldState::Idle));
        assert_eq!(h.state("b"), Some(ManifoldState::Stopping));

        assert_eq!(h.step().await, "exited");
        assert_eq!(h.state("b"), Some(ManifoldState::Idle));
        assert_eq!(h.step().await, "retry");
        assert_eq!(h.state("b"), Some(ManifoldState::Starting));
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("b"), Some(ManifoldState::Running));
        assert_eq!(b_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_dependents_first() {
        let mut h = Harness::new(EngineConfig::default());
        h.install("a", parked(Arc::new(AtomicU32::new(0)))).expect("a");
        h.step().await;
        h.install("b", parked(Arc::new(AtomicU32::new(0))).with_inputs(["a"]))
            .expect("b");
        h.step().await;

        h.actor.handle(Message::Kill);
        assert!(h.report.borrow().shutting_down);
        assert_eq!(h.state("b"), Some(ManifoldState::Stopping));
        assert_eq!(h.state("a"), Some(ManifoldState::Running));

        h.step().await;
        assert_eq!(h.state("b"), Some(ManifoldState::Idle));
        assert_eq!(h.state("a"), Some(ManifoldState::Stopping));
        h.step().await;
        assert!(h.actor.is_finished());

        let err = h
            .install("c", parked(Arc::new(AtomicU32::new(0))))
            .expect_err("installing after kill");
        assert_eq!(err, EngineError::ShuttingDown);
    }

    #[tokio::test]
    async fn cycle_is_stopped_all_at_once() {
        let mut h = Harness::new(EngineConfig::default());
        let ignore = || {
            Manifold::new(|_r| async {
                let w: WorkerRef = TaskWorker::spawn(|ctx| async move {
                    ctx.cancelled().await;
                    Ok(())
                });
                Ok(w)
            })
        };
        h.install("x", ignore().with_inputs(["y"])).expect("x");
        h.install("y", ignore().with_inputs(["x"])).expect("y");
        // Two live workers feeding each other; start results are never fed back.
        for name in ["x", "y"] {
            let w: WorkerRef = TaskWorker::spawn(|ctx| async move {
                ctx.cancelled().await;
                Ok(())
            });
            if let Some(rec) = h.actor.registry.get_mut(name) {
                rec.state = ManifoldState::Running;
                rec.worker = Some(w);
            }
        }

        h.actor.handle(Message::Kill);
        assert_eq!(h.state("x"), Some(ManifoldState::Stopping));
        assert_eq!(h.state("y"), Some(ManifoldState::Stopping));
    }

    /// Start routine that holds until `gate` is notified, once per attempt.
    fn gated(gate: Arc<Notify>, attempts: Arc<AtomicU32>) -> Manifold {
        Manifold::new(move |_r: Resolver| {
            attempts.fetch_add(1, Ordering::SeqCst);
            let gate = gate.clone();
            async move {
                gate.notified().await;
                let w: WorkerRef = TaskWorker::spawn(|ctx: CancellationToken| async move {
                    ctx.cancelled().await;
                    Ok(())
                });
                Ok(w)
            }
        })
    }

    fn start_attempts(h: &Harness, name: &str) -> Option<u64> {
        h.actor.registry.get(name).map(|r| r.start_attempts)
    }

    #[tokio::test]
    async fn stale_start_result_is_killed_and_dropped() {
        let mut h = Harness::new(EngineConfig::default());
        let gate = Arc::new(Notify::new());
        h.install("a", gated(gate.clone(), Arc::new(AtomicU32::new(0))))
            .expect("install");
        let ticket = h.actor.registry.get("a").map(|r| r.ticket).expect("record");

        let late = TaskWorker::spawn(|ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Ok(())
        });
        let result: WorkerRef = late.clone();
        h.actor.handle(Message::Started {
            name: "a".into(),
            ticket: ticket - 1,
            result: Ok(result),
        });
        assert!(late.is_killed());
        assert_eq!(h.state("a"), Some(ManifoldState::Starting));
        assert!(h.worker("a").is_none());
        assert_eq!(h.report.borrow().manifold("a").map(|m| m.generation), Some(0));

        gate.notify_one();
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("a"), Some(ManifoldState::Running));
        assert_eq!(h.report.borrow().manifold("a").map(|m| m.generation), Some(1));
    }

    #[tokio::test]
    async fn input_change_while_starting_restarts_once() {
        let mut h = Harness::new(EngineConfig::default());
        h.install("a", parked(Arc::new(AtomicU32::new(0)))).expect("a");
        h.step().await;

        let gate = Arc::new(Notify::new());
        let b_attempts = Arc::new(AtomicU32::new(0));
        h.install("b", gated(gate.clone(), b_attempts.clone()).with_inputs(["a"]))
            .expect("b");
        assert_eq!(h.state("b"), Some(ManifoldState::Starting));

        h.worker("a").expect("a worker").kill();
        assert_eq!(h.step().await, "exited");
        assert_eq!(h.state("b"), Some(ManifoldState::Starting));
        assert!(h.actor.registry.get("b").is_some_and(|r| r.restart_pending));

        // The worker that arrives after the change is stopped straight away.
        gate.notify_one();
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("b"), Some(ManifoldState::Stopping));
        let first = h.worker("b").expect("b worker");
        assert_eq!(
            first.downcast_ref::<TaskWorker<()>>().map(|w| w.is_killed()),
            Some(true)
        );

        assert_eq!(h.step().await, "exited");
        assert_eq!(h.state("b"), Some(ManifoldState::Idle));
        assert_eq!(h.step().await, "retry");
        assert_eq!(h.state("b"), Some(ManifoldState::Starting));
        gate.notify_one();
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("b"), Some(ManifoldState::Running));

        assert_eq!(b_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(start_attempts(&h, "b"), Some(2));
        assert_eq!(h.report.borrow().manifold("b").map(|m| m.generation), Some(3));
    }

    #[tokio::test]
    async fn input_change_cancels_pending_retry() {
        let cfg = EngineConfig {
            error_backoff: BackoffPolicy::fixed(Duration::from_secs(60)),
            ..EngineConfig::default()
        };
        let mut h = Harness::new(cfg);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let flaky = Manifold::new(move |_r: Resolver| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    return Err(TaskError::fail("boom"));
                }
                let w: WorkerRef = TaskWorker::spawn(|ctx: CancellationToken| async move {
                    ctx.cancelled().await;
                    Ok(())
                });
                Ok(w)
            }
        })
        .with_inputs(["d"]);

        h.install("a", flaky).expect("a");
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("a"), Some(ManifoldState::Idle));
        let pending = h
            .actor
            .registry
            .get("a")
            .and_then(|r| r.retry)
            .expect("retry scheduled");

        h.install("d", parked(Arc::new(AtomicU32::new(0)))).expect("d");
        assert_eq!(h.state("a"), Some(ManifoldState::Starting));
        assert_eq!(start_attempts(&h, "a"), Some(2));
        assert!(h.actor.registry.get("a").is_some_and(|r| r.retry.is_none()));

        // The superseded timer firing later changes nothing.
        h.actor.handle(Message::RetryDue {
            name: "a".into(),
            retry: pending,
        });
        assert_eq!(h.state("a"), Some(ManifoldState::Starting));
        assert_eq!(start_attempts(&h, "a"), Some(2));
    }

    #[tokio::test]
    async fn kill_waits_for_starting_dependent() {
        let mut h = Harness::new(EngineConfig::default());
        h.install("a", parked(Arc::new(AtomicU32::new(0)))).expect("a");
        h.step().await;
        let gate = Arc::new(Notify::new());
        h.install("b", gated(gate.clone(), Arc::new(AtomicU32::new(0))).with_inputs(["a"]))
            .expect("b");

        h.actor.handle(Message::Kill);
        assert_eq!(h.state("a"), Some(ManifoldState::Running));
        assert_eq!(h.state("b"), Some(ManifoldState::Starting));

        gate.notify_one();
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("b"), Some(ManifoldState::Stopping));
        assert_eq!(h.state("a"), Some(ManifoldState::Running));

        assert_eq!(h.step().await, "exited");
        assert_eq!(h.state("b"), Some(ManifoldState::Idle));
        assert_eq!(h.state("a"), Some(ManifoldState::Stopping));
        assert_eq!(h.step().await, "exited");
        assert!(h.actor.is_finished());
    }

    #[tokio::test]
    async fn install_leaves_running_dependents_alone() {
        let mut h = Harness::new(EngineConfig::default());
        h.install("b", parked(Arc::new(AtomicU32::new(0))).with_inputs(["a"]))
            .expect("b");
        h.step().await;
        assert_eq!(h.state("b"), Some(ManifoldState::Running));

        let gate = Arc::new(Notify::new());
        h.install("a", gated(gate.clone(), Arc::new(AtomicU32::new(0))))
            .expect("a");
        assert_eq!(h.state("a"), Some(ManifoldState::Starting));
        assert_eq!(h.state("b"), Some(ManifoldState::Running));

        gate.notify_one();
        assert_eq!(h.step().await, "started");
        assert_eq!(h.state("b"), Some(ManifoldState::Stopping));
    }
}
