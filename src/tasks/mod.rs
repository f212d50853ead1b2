//! # Workers and manifolds.
//!
//! This module provides the types a collaborator plugs into the engine:
//! - [`Worker`] - trait for a running, stoppable unit of work
//! - [`WorkerRef`] - shared reference to a worker (`Arc<dyn Worker>`)
//! - [`TaskWorker`] - closure-backed worker driven by a cancellation token
//! - [`Manifold`] - descriptor bundling inputs, a start routine and an output routine

mod manifold;
mod task_worker;
mod worker;

pub use manifold::{Manifold, OutputFn, StartFn, StartFuture};
pub use task_worker::TaskWorker;
pub(crate) use task_worker::panic_message;
pub use worker::{AsAny, Worker, WorkerRef};
