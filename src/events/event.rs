//! # Lifecycle events emitted by the engine loop.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Manifold events**: install, start attempts, exits, bounces and restarts of one manifold
//! - **Engine events**: shutdown requests, fatal errors, final stop
//! - **Subscriber events**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, manifold name,
//! reasons, generations and restart delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use depvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_manifold("db")
//!     .with_reason("connection refused")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(3));
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.manifold.as_deref(), Some("db"));
//! assert_eq!(ev.delay_ms, Some(3_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `manifold`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `manifold`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    // === Manifold events ===
    /// A manifold was accepted by the registry.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    ManifoldInstalled,

    /// A start routine was invoked.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    /// - `attempt`: start attempts so far (1-based, per manifold)
    StartAttempted,

    /// A start routine returned a live worker.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    /// - `attempt`: start attempt that produced the worker
    /// - `generation`: generation after the change
    ManifoldStarted,

    /// A live worker exited.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    /// - `generation`: generation after the change
    /// - `reason`: exit error, if any
    ManifoldExited,

    /// A start routine or worker reported unmet dependencies.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    UnmetDependencies,

    /// A restart was scheduled after a transient error or a bounce.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    /// - `attempt`: consecutive failures (0 for bounce restarts)
    /// - `delay_ms`: delay before the next start attempt
    /// - `reason`: last error message (failure-driven restarts only)
    RestartScheduled,

    /// A running worker was asked to stop because one of its inputs changed.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    /// - `reason`: the input that changed
    ManifoldBounced,

    /// A running worker was asked to stop as part of engine shutdown.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    StopRequested,

    // === Engine events ===
    /// A worker exit matched the fatal predicate.
    ///
    /// Sets:
    /// - `manifold`: manifold name
    /// - `reason`: fatal error message
    FatalError,

    /// Shutdown requested via [`Engine::kill`](crate::Engine::kill).
    ShutdownRequested,

    /// Every worker has stopped and the engine loop exited.
    ///
    /// Sets:
    /// - `reason`: fatal error message, if shutdown was caused by one
    EngineStopped,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
            EventKind::ManifoldInstalled => "manifold_installed",
            EventKind::StartAttempted => "start_attempted",
            EventKind::ManifoldStarted => "manifold_started",
            EventKind::ManifoldExited => "manifold_exited",
            EventKind::UnmetDependencies => "unmet_dependencies",
            EventKind::RestartScheduled => "restart_scheduled",
            EventKind::ManifoldBounced => "manifold_bounced",
            EventKind::StopRequested => "stop_requested",
            EventKind::FatalError => "fatal_error",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::EngineStopped => "engine_stopped",
        }
    }
}

/// Engine event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the manifold (or subscriber), if applicable.
    pub manifold: Option<Arc<str>>,
    /// Human-readable reason (errors, changed inputs, overflow details).
    pub reason: Option<Arc<str>>,
    /// Attempt or failure count.
    pub attempt: Option<u64>,
    /// Manifold generation after the change.
    pub generation: Option<u64>,
    /// Restart delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            manifold: None,
            reason: None,
            attempt: None,
            generation: None,
            delay_ms: None,
        }
    }

    /// Attaches a manifold name.
    #[inline]
    pub fn with_manifold(mut self, name: impl Into<Arc<str>>) -> Self {
        self.manifold = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a restart delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_manifold(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_manifold(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::ManifoldInstalled);
        let b = Event::new(EventKind::ManifoldInstalled);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates_at_u32_millis() {
        let ev = Event::new(EventKind::RestartScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn subscriber_helpers_set_kind() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.manifold.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
        assert!(Event::subscriber_panicked("audit", "boom".into()).is_subscriber_panic());
    }
}
