//! # Manifold registry: the records owned by the engine loop.
//!
//! One [`ManifoldRecord`] per installed manifold. The registry is a plain value owned
//! by [`EngineActor`](super::actor::EngineActor); nothing else touches it, so there is
//! no locking.
//!
//! ## Responsibilities
//! - reject duplicate names;
//! - keep each record's `dependents` in sync as manifolds arrive in any order;
//! - build a point-in-time [`Resolver`] for a start attempt;
//! - answer graph questions for the loop (are all inputs installed? which running
//!   records can be stopped without pulling a resource from a live consumer?);
//! - render the diagnostic [`Report`].
//!
//! ## Rules
//! - `worker.is_some()` only in `Running` and `Stopping`.
//! - `generation` only ever grows.
//! - Dependents are kept sorted so fan-out order is deterministic.

use std::collections::{BTreeSet, HashMap};

use tokio::time::Instant;

use crate::core::report::{ManifoldReport, ManifoldState, Report};
use crate::core::resolver::{Dependency, Resolver};
use crate::error::{EngineError, TaskError};
use crate::tasks::{Manifold, WorkerRef};

/// Engine-internal mutable state of one manifold.
pub(crate) struct ManifoldRecord {
    pub(crate) manifold: Manifold,
    pub(crate) state: ManifoldState,
    pub(crate) worker: Option<WorkerRef>,
    pub(crate) last_error: Option<TaskError>,
    pub(crate) generation: u64,
    pub(crate) dependents: BTreeSet<String>,

    /// Identifies the current start attempt and the worker it produced; results
    /// carrying another ticket are stale.
    pub(crate) ticket: u64,
    pub(crate) start_attempts: u64,
    /// Consecutive transient failures.
    pub(crate) failures: u32,
    /// An input changed while starting or stopping; start again once settled.
    pub(crate) restart_pending: bool,
    /// Outstanding delayed restart, if any.
    pub(crate) retry: Option<u64>,
    pub(crate) unmet_since: Option<Instant>,
}

impl ManifoldRecord {
    fn new(manifold: Manifold) -> Self {
        Self {
            manifold,
            state: ManifoldState::Idle,
            worker: None,
            last_error: None,
            generation: 0,
            dependents: BTreeSet::new(),
            ticket: 0,
            start_attempts: 0,
            failures: 0,
            restart_pending: false,
            retry: None,
            unmet_since: None,
        }
    }
}

/// All records, keyed by manifold name.
#[derive(Default)]
pub(crate) struct Registry {
    records: HashMap<String, ManifoldRecord>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a record in the `Idle` state and wires dependents in both directions.
    pub(crate) fn install(&mut self, name: &str, manifold: Manifold) -> Result<(), EngineError> {
        if self.records.contains_key(name) {
            return Err(EngineError::DuplicateName {
                name: name.to_string(),
            });
        }

        let mut record = ManifoldRecord::new(manifold);
        record.dependents = self
            .records
            .iter()
            .filter(|(_, r)| r.manifold.depends_on(name))
            .map(|(n, _)| n.clone())
            .collect();
        for input in record.manifold.inputs() {
            if let Some(dep) = self.records.get_mut(input) {
                dep.dependents.insert(name.to_string());
            }
        }
        self.records.insert(name.to_string(), record);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&ManifoldRecord> {
        self.records.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut ManifoldRecord> {
        self.records.get_mut(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ManifoldRecord)> {
        self.records.iter_mut()
    }

    /// Dependents of `name`, sorted.
    pub(crate) fn dependents(&self, name: &str) -> Vec<String> {
        self.records
            .get(name)
            .map(|r| r.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Declared inputs of `name` with no installed record.
    pub(crate) fn missing_inputs(&self, name: &str) -> Vec<String> {
        self.records
            .get(name)
            .map(|r| {
                r.manifold
                    .inputs()
                    .iter()
                    .filter(|i| !self.records.contains_key(*i))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if every declared input of `name` is installed (running or not).
    pub(crate) fn inputs_installed(&self, name: &str) -> bool {
        self.records.contains_key(name) && self.missing_inputs(name).is_empty()
    }

    /// True if no record is Starting, Running or Stopping.
    pub(crate) fn all_idle(&self) -> bool {
        self.records.values().all(|r| !r.state.is_active())
    }

    /// Builds the resolver for a start attempt of `name`.
    ///
    /// Only `Running` dependencies count as live; a worker being stopped is not handed out.
    pub(crate) fn resolver_for(&self, name: &str) -> Option<Resolver> {
        let record = self.records.get(name)?;
        let inputs = record.manifold.inputs().to_vec();
        let deps = inputs
            .iter()
            .filter_map(|input| {
                let dep = self.records.get(input)?;
                let resolved = match (dep.state, &dep.worker) {
                    (ManifoldState::Running, Some(worker)) => {
                        Dependency::live(worker, dep.manifold.output().cloned())
                    }
                    _ => Dependency::Idle,
                };
                Some((input.clone(), resolved))
            })
            .collect();
        Some(Resolver::new(name, inputs, deps))
    }

    /// Running records that no Starting, Running or Stopping dependent still relies on.
    ///
    /// Sorted by name so shutdown order is deterministic for a given graph.
    pub(crate) fn stoppable(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == ManifoldState::Running)
            .filter(|(_, r)| {
                r.dependents.iter().all(|d| {
                    self.records
                        .get(d)
                        .is_none_or(|dep| !dep.state.is_active())
                })
            })
            .map(|(n, _)| n.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Names of records in `state`, sorted.
    pub(crate) fn in_state(&self, state: ManifoldState) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Renders the per-manifold part of the diagnostic report.
    pub(crate) fn report(&self) -> Report {
        let manifolds = self
            .records
            .iter()
            .map(|(name, r)| {
                let view = ManifoldReport {
                    state: r.state,
                    inputs: r.manifold.inputs().to_vec(),
                    dependents: r.dependents.iter().cloned().collect(),
                    missing_inputs: self.missing_inputs(name),
                    generation: r.generation,
                    start_attempts: r.start_attempts,
                    last_error: r.last_error.clone(),
                    unmet_since: r.unmet_since,
                };
                (name.clone(), view)
            })
            .collect();
        Report {
            manifolds,
            ..Report::default()
        }
    }
}
