//! # Engine configuration.
//!
//! Provides [`EngineConfig`], the centralized settings for one [`Engine`](crate::Engine).
//! All fields are public; start from [`EngineConfig::default`] and override what you need.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1
//! - `bounce_delay = 0s` → bounced workers restart as soon as they exit

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TaskError;
use crate::policies::BackoffPolicy;

/// Predicate deciding whether a worker exit error brings the whole engine down.
pub type IsFatal = Arc<dyn Fn(&TaskError) -> bool + Send + Sync>;

/// Configuration for the engine loop.
///
/// ## Field semantics
/// - `error_backoff`: restart delay after transient errors, indexed by consecutive failures
/// - `bounce_delay`: pause between a bounced worker's exit and its restart
/// - `stall_threshold`: how long a manifold may sit on unmet dependencies (with every
///   input installed) before [`Report::stalled`](crate::Report::stalled) names it
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `is_fatal`: fatal error predicate (default: [`TaskError::is_fatal`])
#[derive(Clone)]
pub struct EngineConfig {
    /// Restart delay after a transient error.
    pub error_backoff: BackoffPolicy,

    /// Delay before restarting a worker that was bounced by a dependency change.
    pub bounce_delay: Duration,

    /// Age after which an unmet-dependency manifold is reported as stalled.
    pub stall_threshold: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` messages observe
    /// `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Fatal error predicate.
    pub is_fatal: IsFatal,
}

impl EngineConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Replaces the fatal error predicate.
    pub fn with_is_fatal<F>(mut self, is_fatal: F) -> Self
    where
        F: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        self.is_fatal = Arc::new(is_fatal);
        self
    }

    /// Applies the fatal predicate to `err`.
    #[inline]
    pub(crate) fn fatal(&self, err: &TaskError) -> bool {
        (self.is_fatal)(err)
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `error_backoff = BackoffPolicy::default()` (fixed 3s)
    /// - `bounce_delay = 10ms`
    /// - `stall_threshold = 5min`
    /// - `bus_capacity = 1024`
    /// - `is_fatal = TaskError::is_fatal` (only `TaskError::Fatal`)
    fn default() -> Self {
        Self {
            error_backoff: BackoffPolicy::default(),
            bounce_delay: Duration::from_millis(10),
            stall_threshold: Duration::from_secs(300),
            bus_capacity: 1024,
            is_fatal: Arc::new(TaskError::is_fatal),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("error_backoff", &self.error_backoff)
            .field("bounce_delay", &self.bounce_delay)
            .field("stall_threshold", &self.stall_threshold)
            .field("bus_capacity", &self.bus_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_predicate_matches_fatal_only() {
        let cfg = EngineConfig::default();
        assert!(cfg.fatal(&TaskError::fatal("gone")));
        assert!(!cfg.fatal(&TaskError::fail("flaky")));
    }

    #[test]
    fn custom_predicate_replaces_default() {
        let cfg = EngineConfig::default().with_is_fatal(|e| matches!(e, TaskError::Fail { .. }));
        assert!(cfg.fatal(&TaskError::fail("flaky")));
        assert!(!cfg.fatal(&TaskError::fatal("gone")));
    }

    #[test]
    fn bus_capacity_is_clamped() {
        let cfg = EngineConfig {
            bus_capacity: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
