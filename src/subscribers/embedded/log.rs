//! # LogWriter: events as `tracing` records
//!
//! A subscriber that renders every [`Event`] through the `tracing` macros, so
//! engine activity lands wherever the embedding application sends its logs.
//!
//! ## Levels
//! - `error`: fatal errors
//! - `warn`: transient restarts, subscriber overflow/panics
//! - `info`: starts, exits, bounces, shutdown
//! - `debug`: installs, start attempts, unmet dependencies, stop requests
//!
//! ## Example output (with `tracing-subscriber` fmt)
//! ```text
//! INFO depvisor: manifold started manifold="db" attempt=1 generation=1
//! WARN depvisor: restart scheduled manifold="api" failures=2 delay_ms=3000 reason="refused"
//! INFO depvisor: manifold bounced manifold="api" input="db"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let manifold = e.manifold.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ManifoldInstalled => {
                debug!(target: "depvisor", seq = e.seq, manifold, "manifold installed");
            }
            EventKind::StartAttempted => {
                debug!(target: "depvisor", seq = e.seq, manifold, attempt = ?e.attempt, "start attempted");
            }
            EventKind::ManifoldStarted => {
                info!(
                    target: "depvisor",
                    seq = e.seq, manifold, attempt = ?e.attempt, generation = ?e.generation,
                    "manifold started"
                );
            }
            EventKind::ManifoldExited => {
                info!(
                    target: "depvisor",
                    seq = e.seq, manifold, generation = ?e.generation, reason,
                    "manifold exited"
                );
            }
            EventKind::UnmetDependencies => {
                debug!(target: "depvisor", seq = e.seq, manifold, "unmet dependencies");
            }
            EventKind::RestartScheduled => {
                warn!(
                    target: "depvisor",
                    seq = e.seq, manifold, failures = ?e.attempt, delay_ms = ?e.delay_ms, reason,
                    "restart scheduled"
                );
            }
            EventKind::ManifoldBounced => {
                info!(target: "depvisor", seq = e.seq, manifold, input = reason, "manifold bounced");
            }
            EventKind::StopRequested => {
                debug!(target: "depvisor", seq = e.seq, manifold, "stop requested");
            }
            EventKind::FatalError => {
                error!(target: "depvisor", seq = e.seq, manifold, reason, "fatal error");
            }
            EventKind::ShutdownRequested => {
                info!(target: "depvisor", seq = e.seq, "shutdown requested");
            }
            EventKind::EngineStopped => {
                info!(target: "depvisor", seq = e.seq, reason, "engine stopped");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "depvisor", seq = e.seq, subscriber = manifold, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "depvisor", seq = e.seq, subscriber = manifold, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
