//! # Backoff policy for restarting failed workers.
//!
//! [`BackoffPolicy`] controls how long the engine waits before restarting a manifold
//! whose worker (or start routine) exited with a transient error. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first failure;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay after `n` consecutive failures is `first × factor^(n-1)`, clamped to `max`,
//! then jitter is applied. The base delay is derived purely from the failure count, so
//! jitter output never feeds back into later delays.
//!
//! The engine default is [`BackoffPolicy::fixed`] at three seconds: a constant floor that
//! keeps a crashing worker from spinning.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use depvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay_for(11), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Restart backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy to spread simultaneous restarts.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a constant three second delay without jitter.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl BackoffPolicy {
    /// Constant delay, no growth, no jitter.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay after `failures` consecutive failures (1-based).
    ///
    /// `0` is treated like `1`. The base delay is clamped to [`BackoffPolicy::max`]
    /// before jitter; non-finite or negative intermediate values also clamp to `max`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max.as_secs_f64();
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
