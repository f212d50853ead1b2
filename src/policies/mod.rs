//! Restart delay policies.
//!
//! This module groups the knobs that control **how long** the engine waits before
//! restarting a manifold after a transient failure.
//!
//! ## Contents
//! - [`BackoffPolicy`] how restart delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized restarts
//!
//! ## Quick wiring
//! ```text
//! EngineConfig { error_backoff: BackoffPolicy, bounce_delay, .. }
//!      └─► core::actor::EngineActor uses:
//!           - error_backoff.delay_for(failures) after a transient exit
//!           - bounce_delay after a dependency-driven bounce
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → fixed 3s, jitter=None.
//! - `JitterPolicy::None` by default; consider `Equal` when many manifolds share a dependency.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
