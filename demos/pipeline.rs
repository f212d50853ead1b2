//! # Dependency-driven pipeline
//!
//! Demonstrates:
//! - sharing a resource between manifolds through an output routine
//! - a dependent started lazily once its input is running
//! - transient failures restarted with backoff
//! - a dependent bounced when its input restarts
//! - graceful shutdown (dependents first)
//!
//! Run with `RUST_LOG=depvisor=debug cargo run --example pipeline` for the engine's own logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use depvisor::{
    BackoffPolicy, Engine, EngineConfig, LogWriter, Manifold, Output, Resolver, Subscribe,
    TaskError, TaskWorker, WorkerRef,
};

type Counter = Arc<AtomicU64>;

/// Counts ticks and exposes the counter to dependents.
fn ticker() -> Manifold {
    Manifold::new(|_r: Resolver| async {
        let counter: Counter = Arc::new(AtomicU64::new(0));
        let ticks = counter.clone();
        let w: WorkerRef = TaskWorker::with_resource(counter, move |ctx: CancellationToken| async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {
                        let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        // Simulated crash every 15 ticks.
                        if n % 15 == 0 {
                            return Err(TaskError::fail("ticker lost its clock"));
                        }
                    }
                }
            }
        });
        Ok(w)
    })
    .with_output(|w: &WorkerRef, out: &mut Output| {
        match w.downcast_ref::<TaskWorker<Counter>>() {
            Some(w) => out.put(w.resource().clone()),
            None => false,
        }
    })
}

/// Prints the ticker's counter once a second.
fn reporter() -> Manifold {
    Manifold::new(|r: Resolver| async move {
        let counter: Counter = r.get("ticker")?;
        let w: WorkerRef = TaskWorker::spawn(move |ctx: CancellationToken| async move {
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        println!("reporter: stopping");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        println!("reporter: {} ticks", counter.load(Ordering::Relaxed));
                    }
                }
            }
        });
        Ok::<WorkerRef, TaskError>(w)
    })
    .with_inputs(["ticker"])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("depvisor=info")),
        )
        .init();

    let cfg = EngineConfig {
        error_backoff: BackoffPolicy {
            first: Duration::from_millis(500),
            max: Duration::from_secs(5),
            factor: 2.0,
            ..BackoffPolicy::default()
        },
        ..EngineConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let engine = Engine::builder(cfg).with_subscribers(subs).build();

    // Installed before its input: stays idle until "ticker" runs.
    engine.install("reporter", reporter()).await?;
    engine.install("ticker", ticker()).await?;

    let stopper = engine.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(8)).await;
        stopper.kill();
    });

    engine.wait_or_signal().await?;
    println!("final report: {:#?}", engine.report());
    Ok(())
}
