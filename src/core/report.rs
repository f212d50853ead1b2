//! # Diagnostics snapshot.
//!
//! The engine loop publishes a [`Report`] after every event it handles; callers read
//! the latest one with [`Engine::report`](crate::Engine::report) without talking to
//! the loop. The view is eventually consistent: it may trail the loop by the event
//! currently being handled.
//!
//! ## Stall detection
//! A cyclic graph (or a dependency that never produces what its consumers want) leaves
//! manifolds idle on unmet dependencies forever. That is a steady state, not an error,
//! but a manifold that has been in it for longer than
//! [`EngineConfig::stall_threshold`](crate::EngineConfig::stall_threshold) while every
//! one of its inputs is installed is listed in [`Report::stalled`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::TaskError;

/// Lifecycle state of one manifold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ManifoldState {
    /// Never started, or stopped with no live worker.
    #[default]
    Idle,
    /// Start routine in flight.
    Starting,
    /// Worker alive.
    Running,
    /// Stop requested, waiting for the worker to exit.
    Stopping,
}

impl ManifoldState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManifoldState::Idle => "idle",
            ManifoldState::Starting => "starting",
            ManifoldState::Running => "running",
            ManifoldState::Stopping => "stopping",
        }
    }

    /// True for every state except [`ManifoldState::Idle`].
    pub fn is_active(&self) -> bool {
        !matches!(self, ManifoldState::Idle)
    }
}

impl fmt::Display for ManifoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Diagnostic view of one manifold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManifoldReport {
    /// Current lifecycle state.
    pub state: ManifoldState,
    /// Declared inputs, in declaration order.
    pub inputs: Vec<String>,
    /// Installed manifolds that list this one as an input.
    pub dependents: Vec<String>,
    /// Declared inputs with no installed manifold.
    pub missing_inputs: Vec<String>,
    /// Times the live worker changed (started or exited).
    pub generation: u64,
    /// Start routine invocations so far.
    pub start_attempts: u64,
    /// Last transient or fatal error; unmet dependencies are not recorded here.
    pub last_error: Option<TaskError>,
    /// Since when the manifold has been idle on unmet dependencies.
    pub unmet_since: Option<Instant>,
}

impl ManifoldReport {
    /// True if idle on unmet dependencies for at least `threshold` at `now`,
    /// with every input installed.
    pub fn is_stalled(&self, now: Instant, threshold: Duration) -> bool {
        self.state == ManifoldState::Idle
            && self.missing_inputs.is_empty()
            && self
                .unmet_since
                .is_some_and(|since| now.saturating_duration_since(since) >= threshold)
    }
}

/// Engine-wide diagnostic snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    /// Per-manifold views, keyed by name.
    pub manifolds: BTreeMap<String, ManifoldReport>,
    /// True once shutdown began (kill or fatal error).
    pub shutting_down: bool,
    /// The fatal error that caused shutdown, if any.
    pub fatal_error: Option<TaskError>,
    /// Manifolds stuck on unmet dependencies past the stall threshold (sorted).
    pub stalled: Vec<String>,
}

impl Report {
    /// View of one manifold.
    pub fn manifold(&self, name: &str) -> Option<&ManifoldReport> {
        self.manifolds.get(name)
    }

    /// State of one manifold.
    pub fn state(&self, name: &str) -> Option<ManifoldState> {
        self.manifolds.get(name).map(|m| m.state)
    }

    /// Recomputes [`Report::stalled`] against `now`.
    pub(crate) fn mark_stalled(&mut self, now: Instant, threshold: Duration) {
        self.stalled = self
            .manifolds
            .iter()
            .filter(|(_, m)| m.is_stalled(now, threshold))
            .map(|(name, _)| name.clone())
            .collect();
    }
}
