#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use depvisor::{
    Engine, EngineConfig, Manifold, ManifoldState, Output, Report, Resolver, TaskError,
    TaskWorker, WorkerRef,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Installs a test `tracing` subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("depvisor=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Engine with default config and test logging.
pub fn engine() -> Arc<Engine> {
    engine_with(EngineConfig::default())
}

pub fn engine_with(cfg: EngineConfig) -> Arc<Engine> {
    init_tracing();
    Engine::start(cfg)
}

/// Ordered record of what workers did: "start:a", "stop:b", ...
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    /// Position of the first occurrence of `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Hands out the resource a [`parked`] worker carries.
pub fn int_output(w: &WorkerRef, out: &mut Output) -> bool {
    match w.downcast_ref::<TaskWorker<i32>>() {
        Some(w) => out.put(*w.resource()),
        None => false,
    }
}

/// Worker carrying `value` that runs until killed (clean exit) or `trigger` fires
/// (exit with `on_trigger`).
pub fn parked_worker(
    name: &str,
    value: i32,
    journal: Journal,
    trigger: Arc<Notify>,
    on_trigger: Result<(), TaskError>,
) -> WorkerRef {
    let name = name.to_string();
    TaskWorker::with_resource(value, move |ctx: CancellationToken| async move {
        tokio::select! {
            _ = ctx.cancelled() => {
                journal.push(format!("stop:{name}"));
                Ok(())
            }
            _ = trigger.notified() => {
                journal.push(format!("exit:{name}"));
                on_trigger
            }
        }
    })
}

/// Manifold whose worker carries `42` and parks until killed.
pub fn parked(name: &str, journal: &Journal) -> Manifold {
    triggered(name, journal, Arc::new(Notify::new()), Ok(()))
}

/// Like [`parked`], but the worker exits with `on_trigger` once `trigger` is notified.
pub fn triggered(
    name: &str,
    journal: &Journal,
    trigger: Arc<Notify>,
    on_trigger: Result<(), TaskError>,
) -> Manifold {
    let name = name.to_string();
    let journal = journal.clone();
    Manifold::new(move |_r: Resolver| {
        journal.push(format!("start:{name}"));
        let w = parked_worker(&name, 42, journal.clone(), trigger.clone(), on_trigger.clone());
        async move { Ok(w) }
    })
    .with_output(int_output)
}

/// Manifold that needs an `i32` from each of `inputs` before its worker parks.
pub fn consumer(name: &str, inputs: &[&str], journal: &Journal) -> Manifold {
    let name = name.to_string();
    let journal = journal.clone();
    let wanted: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();
    Manifold::new(move |r: Resolver| {
        journal.push(format!("start:{name}"));
        let (name, journal, wanted) = (name.clone(), journal.clone(), wanted.clone());
        async move {
            for input in &wanted {
                let _: i32 = r.get(input)?;
            }
            Ok::<WorkerRef, TaskError>(parked_worker(
                &name,
                7,
                journal,
                Arc::new(Notify::new()),
                Ok(()),
            ))
        }
    })
    .with_inputs(inputs.iter().copied())
    .with_output(int_output)
}

/// Counts start attempts.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Waits (on the paused clock) until `pred` holds for a published report.
pub async fn until(engine: &Engine, pred: impl FnMut(&Report) -> bool) -> Report {
    let mut rx = engine.watch_report();
    let res = tokio::time::timeout(Duration::from_secs(600), rx.wait_for(pred)).await;
    match res {
        Ok(Ok(report)) => report.clone(),
        Ok(Err(_)) => panic!("engine loop exited while waiting"),
        Err(_) => panic!("condition not reached; last report: {:#?}", engine.report()),
    }
}

/// Waits until `name` is in `state`.
pub async fn until_state(engine: &Engine, name: &str, state: ManifoldState) -> Report {
    until(engine, |r| r.state(name) == Some(state)).await
}

/// Lets spawned tasks and timers run for `d` of paused time.
pub async fn settle(d: Duration) {
    tokio::time::sleep(d).await;
}
