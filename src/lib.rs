//! # depvisor
//!
//! **Depvisor** is a dependency-driven supervision engine for async workers.
//!
//! It runs a dynamic set of long-lived workers, restarts them according to
//! failure policy, bounces them when the workers they depend on change, and lets
//! them exchange typed resources without being statically wired together.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Manifold   │   │   Manifold   │   │   Manifold   │
//!     │   "config"   │   │  "database"  │   │    "api"     │
//!     │  inputs: []  │   │ in: [config] │   │ in: [db,cfg] │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ install          ▼ install          ▼ install
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Engine (facade)                                                  │
//! │  - inbox (mpsc) ─────────► EngineActor (single consumer)          │
//! │  - Bus (broadcast events)    ├─ Registry: name → ManifoldRecord   │
//! │  - SubscriberSet             ├─ Resolver per start attempt        │
//! │  - watch<Report>             └─ restart / bounce / shutdown logic │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼ start(resolver)  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Worker    │   │    Worker    │   │    Worker    │
//!     │ kill / wait  │   │ kill / wait  │   │ kill / wait  │
//!     └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ### Lifecycle of one manifold
//! ```text
//! install ──► start(resolver)
//!               ├─ Ok(worker)            ─► Running, generation += 1, dependents bounced/started
//!               └─ Err(e)                ─► classify(e)
//! worker exits ─► generation += 1, dependents bounced/started, classify(result)
//!
//! classify:
//!   Ok / Canceled          ─► Idle until an input changes
//!   is_fatal(e)            ─► engine shutdown, wait() returns e
//!   UnmetDependencies      ─► Idle until an input changes (not a fault)
//!   anything else          ─► Idle, restart after error_backoff
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                      |
//! |-------------------|--------------------------------------------------------------|-----------------------------------------|
//! | **Engine**        | Install manifolds, kill, wait, diagnostics.                  | [`Engine`], [`EngineConfig`]            |
//! | **Workers**       | The task contract and a closure-backed implementation.       | [`Worker`], [`TaskWorker`]              |
//! | **Dependencies**  | Declarative inputs and typed resource lookup.                | [`Manifold`], [`Resolver`], [`Output`]  |
//! | **Policies**      | Restart delay after transient errors.                        | [`BackoffPolicy`], [`JitterPolicy`]     |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics).               | [`Subscribe`], [`LogWriter`]            |
//! | **Errors**        | Typed errors for install, exit and resolution.               | [`EngineError`], [`TaskError`], [`ResolveError`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use depvisor::{
//!     Engine, EngineConfig, LogWriter, Manifold, Output, Resolver, Subscribe, TaskError,
//!     TaskWorker, WorkerRef,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let engine = Engine::builder(EngineConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // Exposes a port number to its dependents.
//!     let config = Manifold::new(|_r: Resolver| async {
//!         let w: WorkerRef = TaskWorker::with_resource(8080u16, |ctx: CancellationToken| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         });
//!         Ok(w)
//!     })
//!     .with_output(|w: &WorkerRef, out: &mut Output| {
//!         match w.downcast_ref::<TaskWorker<u16>>() {
//!             Some(w) => out.put(*w.resource()),
//!             None => false,
//!         }
//!     });
//!
//!     // Runs only once the port is available; `?` maps "not ready" to UnmetDependencies.
//!     let server = Manifold::new(|r: Resolver| async move {
//!         let port: u16 = r.get("config")?;
//!         let w: WorkerRef = TaskWorker::spawn(move |ctx: CancellationToken| async move {
//!             let _ = port;
//!             ctx.cancelled().await;
//!             Ok(())
//!         });
//!         Ok::<WorkerRef, TaskError>(w)
//!     })
//!     .with_inputs(["config"]);
//!
//!     engine.install("server", server).await?;
//!     engine.install("config", config).await?;
//!
//!     engine.kill();
//!     engine.wait().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use crate::core::{
    Engine, EngineBuilder, EngineConfig, IsFatal, ManifoldReport, ManifoldState, Output, Report,
    Resolver,
};
pub use error::{EngineError, ResolveError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{AsAny, Manifold, OutputFn, StartFn, StartFuture, TaskWorker, Worker, WorkerRef};
