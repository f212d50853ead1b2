//! # Manifold: a node in the engine's dependency graph.
//!
//! A [`Manifold`] is an immutable descriptor installed into the
//! [`Engine`](crate::Engine) under a unique name. It bundles:
//! - the names of the manifolds it may consume (`inputs`);
//! - a start routine building a [`Worker`](crate::Worker) from a [`Resolver`];
//! - an optional output routine coercing its running worker into resources for dependents.
//!
//! Inputs may name manifolds that are not installed yet; they are resolved lazily.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use depvisor::{Manifold, Output, Resolver, TaskError, TaskWorker, WorkerRef};
//!
//! let clock = Manifold::new(|_r: Resolver| async move {
//!     let w: WorkerRef = TaskWorker::with_resource(60u64, |ctx: CancellationToken| async move {
//!         ctx.cancelled().await;
//!         Ok(())
//!     });
//!     Ok(w)
//! })
//! .with_output(|w: &WorkerRef, out: &mut Output| {
//!     match w.downcast_ref::<TaskWorker<u64>>() {
//!         Some(w) => out.put(*w.resource()),
//!         None => false,
//!     }
//! });
//!
//! let ticker = Manifold::new(|r: Resolver| async move {
//!     let period: u64 = r.get("clock")?;
//!     let w: WorkerRef = TaskWorker::spawn(move |ctx: CancellationToken| async move {
//!         let _ = period;
//!         ctx.cancelled().await;
//!         Ok(())
//!     });
//!     Ok::<WorkerRef, TaskError>(w)
//! })
//! .with_inputs(["clock"]);
//!
//! assert!(clock.inputs().is_empty());
//! assert_eq!(ticker.inputs(), ["clock".to_string()]);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::core::{Output, Resolver};
use crate::error::TaskError;
use crate::tasks::worker::WorkerRef;

/// Future returned by a start routine.
pub type StartFuture = BoxFuture<'static, Result<WorkerRef, TaskError>>;

/// Start routine: builds a worker given a point-in-time resolver.
pub type StartFn = Arc<dyn Fn(Resolver) -> StartFuture + Send + Sync>;

/// Output routine: fills `out` from the running worker, returning `true` on success.
pub type OutputFn = Arc<dyn Fn(&WorkerRef, &mut Output) -> bool + Send + Sync>;

/// Immutable descriptor of a supervised unit of work.
#[derive(Clone)]
pub struct Manifold {
    inputs: Vec<String>,
    start: StartFn,
    output: Option<OutputFn>,
}

impl Manifold {
    /// Creates a manifold with no inputs and no output routine.
    ///
    /// The start routine should return [`TaskError::UnmetDependencies`] rather than
    /// wait when a dependency it needs is unavailable.
    pub fn new<F, Fut>(start: F) -> Self
    where
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<WorkerRef, TaskError>> + Send + 'static,
    {
        Self {
            inputs: Vec::new(),
            start: Arc::new(move |resolver| start(resolver).boxed()),
            output: None,
        }
    }

    /// Returns a manifold with the given inputs (order kept, duplicates dropped).
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.clear();
        for input in inputs {
            let input = input.into();
            if !self.inputs.contains(&input) {
                self.inputs.push(input);
            }
        }
        self
    }

    /// Returns a manifold with the given output routine.
    pub fn with_output<F>(mut self, output: F) -> Self
    where
        F: Fn(&WorkerRef, &mut Output) -> bool + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(output));
        self
    }

    /// Declared inputs, in declaration order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// True if `name` is a declared input.
    pub fn depends_on(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }

    /// Invokes the start routine.
    pub(crate) fn start(&self, resolver: Resolver) -> StartFuture {
        (self.start)(resolver)
    }

    /// The output routine, if any.
    pub(crate) fn output(&self) -> Option<&OutputFn> {
        self.output.as_ref()
    }
}

impl fmt::Debug for Manifold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manifold")
            .field("inputs", &self.inputs)
            .field("output", &self.output.is_some())
            .finish()
    }
}
