//! Error types used by the depvisor engine, its workers and resolvers.
//!
//! This module defines three enums:
//!
//! - [`EngineError`] - errors returned by the [`Engine`](crate::Engine) facade itself.
//! - [`TaskError`] - exit errors of workers and start routines.
//! - [`ResolveError`] - why a [`Resolver`](crate::Resolver) lookup could not produce a resource.
//!
//! All of them provide `as_label` for logs/metrics.

use thiserror::Error;

/// # Errors produced by the engine facade.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A manifold with the same name is already installed.
    #[error("manifold {name:?} is already installed")]
    DuplicateName {
        /// The rejected name.
        name: String,
    },

    /// The engine is shutting down (or already stopped) and accepts no new manifolds.
    #[error("engine is shutting down")]
    ShuttingDown,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use depvisor::EngineError;
    ///
    /// let err = EngineError::DuplicateName { name: "db".into() };
    /// assert_eq!(err.as_label(), "engine_duplicate_name");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::DuplicateName { .. } => "engine_duplicate_name",
            EngineError::ShuttingDown => "engine_shutting_down",
        }
    }
}

/// # Errors produced by workers and start routines.
///
/// How the engine reacts to each variant:
/// - [`TaskError::UnmetDependencies`]: left idle until an input changes, no delay, not a fault.
/// - [`TaskError::Canceled`]: clean exit after a stop request.
/// - [`TaskError::Fatal`]: fatal under the default predicate, shuts the whole engine down.
/// - [`TaskError::Fail`]: transient, restarted after the configured backoff.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The worker cannot usefully run with the currently available dependencies.
    #[error("cannot run with available dependencies")]
    UnmetDependencies,

    /// Non-recoverable error; matched by the default fatal predicate.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Execution failed but may succeed if restarted.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The worker stopped because it was asked to.
    #[error("worker stopped")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(error: impl std::fmt::Display) -> Self {
        TaskError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use depvisor::TaskError;
    ///
    /// assert_eq!(TaskError::UnmetDependencies.as_label(), "task_unmet_dependencies");
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::UnmetDependencies => "task_unmet_dependencies",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Default fatal predicate: only [`TaskError::Fatal`] brings the engine down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal { .. })
    }

    /// True for [`TaskError::UnmetDependencies`].
    pub fn is_unmet_dependencies(&self) -> bool {
        matches!(self, TaskError::UnmetDependencies)
    }
}

/// # Why a resource lookup failed.
///
/// Three outcomes are distinguished: the name is unknown to the caller
/// (`Undeclared`, `Missing`), the dependency has no live worker (`NotRunning`),
/// or it is live but cannot produce the requested shape (`ShapeMismatch`).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The name is not among the resolving manifold's inputs.
    #[error("{name:?} is not a declared input")]
    Undeclared {
        /// The requested dependency.
        name: String,
    },

    /// No manifold with that name is installed.
    #[error("{name:?} is not installed")]
    Missing {
        /// The requested dependency.
        name: String,
    },

    /// The manifold is installed but has no live worker.
    #[error("{name:?} has no running worker")]
    NotRunning {
        /// The requested dependency.
        name: String,
    },

    /// The worker is live but cannot produce a value of the requested type.
    #[error("{name:?} cannot provide {wanted}")]
    ShapeMismatch {
        /// The requested dependency.
        name: String,
        /// Type name of the requested resource.
        wanted: &'static str,
    },
}

impl ResolveError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolveError::Undeclared { .. } => "resolve_undeclared",
            ResolveError::Missing { .. } => "resolve_missing",
            ResolveError::NotRunning { .. } => "resolve_not_running",
            ResolveError::ShapeMismatch { .. } => "resolve_shape_mismatch",
        }
    }
}

/// An unavailable resource means "not ready": start routines can use `?`.
impl From<ResolveError> for TaskError {
    fn from(_: ResolveError) -> Self {
        TaskError::UnmetDependencies
    }
}
