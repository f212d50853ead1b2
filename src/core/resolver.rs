//! # Point-in-time resource resolution.
//!
//! A [`Resolver`] is built by the engine loop for every start attempt of a manifold.
//! It captures which of the manifold's declared inputs exist and which have a live
//! worker at that instant, and never changes afterwards. Dependents see fresh
//! resources only by being bounced and started again with a new resolver.
//!
//! ## Lookup contract
//! ```text
//! get::<T>(name)
//!   ├─ name not in inputs        → Undeclared
//!   ├─ no record for name        → Missing
//!   ├─ record without a worker   → NotRunning (also once the worker is dropped)
//!   ├─ no output routine         → ShapeMismatch
//!   └─ output(worker, Output<T>)
//!        ├─ true + value stored  → Ok(T)
//!        └─ otherwise            → ShapeMismatch
//! ```
//! [`Resolver::probe`] stops before the output step (existence check only).

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::ResolveError;
use crate::tasks::{OutputFn, Worker, WorkerRef};

/// What the engine knew about one declared input when the resolver was built.
///
/// Live workers are held weakly: a resolver kept by a long-running consumer does not
/// keep its dependencies' exited workers in memory. Once the engine drops a worker,
/// lookups against it report `NotRunning`.
#[derive(Clone)]
pub(crate) enum Dependency {
    /// Installed, but no live worker.
    Idle,
    /// Installed with a live worker.
    Live {
        worker: Weak<dyn Worker>,
        output: Option<OutputFn>,
    },
}

impl Dependency {
    pub(crate) fn live(worker: &WorkerRef, output: Option<OutputFn>) -> Self {
        Dependency::Live {
            worker: Arc::downgrade(worker),
            output,
        }
    }
}

/// Out-slot handed to a manifold's output routine.
///
/// The caller picks the resource type; the output routine offers values with
/// [`Output::put`], which only accepts the requested type.
pub struct Output {
    wanted: TypeId,
    wanted_name: &'static str,
    value: Option<Box<dyn Any + Send>>,
}

impl Output {
    pub(crate) fn new<T: Any + Send>() -> Self {
        Self {
            wanted: TypeId::of::<T>(),
            wanted_name: type_name::<T>(),
            value: None,
        }
    }

    /// True if the caller asked for a `T`.
    pub fn wants<T: Any>(&self) -> bool {
        self.wanted == TypeId::of::<T>()
    }

    /// Type name of the requested resource.
    pub fn wanted_type(&self) -> &'static str {
        self.wanted_name
    }

    /// Stores `value` if the caller asked for a `T`; returns whether it was stored.
    pub fn put<T: Any + Send>(&mut self, value: T) -> bool {
        if !self.wants::<T>() {
            return false;
        }
        self.value = Some(Box::new(value));
        true
    }

    fn take<T: Any>(&mut self) -> Option<T> {
        self.value
            .take()
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("wanted", &self.wanted_name)
            .field("filled", &self.value.is_some())
            .finish()
    }
}

/// Read-only lookup of the resources a starting worker may consume.
///
/// Cheap to clone; never blocks and never touches engine state.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Snapshot>,
}

struct Snapshot {
    owner: String,
    inputs: Vec<String>,
    deps: HashMap<String, Dependency>,
}

impl Resolver {
    pub(crate) fn new(
        owner: impl Into<String>,
        inputs: Vec<String>,
        deps: HashMap<String, Dependency>,
    ) -> Self {
        Self {
            inner: Arc::new(Snapshot {
                owner: owner.into(),
                inputs,
                deps,
            }),
        }
    }

    /// Name of the manifold this resolver was built for.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    /// Declared inputs of the owning manifold.
    pub fn inputs(&self) -> &[String] {
        &self.inner.inputs
    }

    /// Checks that `name` is a declared input with a live worker.
    pub fn probe(&self, name: &str) -> Result<(), ResolveError> {
        self.live(name).map(|_| ())
    }

    /// Fetches a `T` from the live worker of input `name`.
    pub fn get<T: Any + Send>(&self, name: &str) -> Result<T, ResolveError> {
        let (worker, output) = self.live(name)?;
        let mismatch = || ResolveError::ShapeMismatch {
            name: name.to_string(),
            wanted: type_name::<T>(),
        };
        let output = output.ok_or_else(mismatch)?;

        let mut out = Output::new::<T>();
        if !output(&worker, &mut out) {
            return Err(mismatch());
        }
        out.take::<T>().ok_or_else(mismatch)
    }

    fn live(&self, name: &str) -> Result<(WorkerRef, Option<&OutputFn>), ResolveError> {
        if !self.inner.inputs.iter().any(|i| i == name) {
            return Err(ResolveError::Undeclared {
                name: name.to_string(),
            });
        }
        match self.inner.deps.get(name) {
            None => Err(ResolveError::Missing {
                name: name.to_string(),
            }),
            Some(Dependency::Idle) => Err(ResolveError::NotRunning {
                name: name.to_string(),
            }),
            Some(Dependency::Live { worker, output }) => match worker.upgrade() {
                Some(worker) => Ok((worker, output.as_ref())),
                None => Err(ResolveError::NotRunning {
                    name: name.to_string(),
                }),
            },
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("owner", &self.inner.owner)
            .field("inputs", &self.inner.inputs)
            .finish()
    }
}
