//! # Worker abstraction.
//!
//! A [`Worker`] is what a manifold's start routine hands back to the engine: something
//! already running that can be asked to stop and that reports exactly how it exited.
//! The engine never polls a worker; it calls [`Worker::wait`] once per worker from a
//! dedicated watcher and reacts to the result.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;

/// # Shared handle to a running worker.
pub type WorkerRef = Arc<dyn Worker>;

/// Upcast helper so output routines can reach the concrete worker type.
///
/// Implemented for every `'static` type; there is nothing to implement by hand.
pub trait AsAny {
    /// Returns `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// # Long-running, stoppable unit of work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio::sync::Notify;
/// use depvisor::{TaskError, Worker};
///
/// struct Parked(Notify);
///
/// #[async_trait]
/// impl Worker for Parked {
///     fn kill(&self) {
///         self.0.notify_one();
///     }
///
///     async fn wait(&self) -> Result<(), TaskError> {
///         self.0.notified().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: AsAny + Send + Sync + 'static {
    /// Requests the worker to stop.
    ///
    /// Must be idempotent and must not block; the worker reports its actual
    /// exit through [`Worker::wait`].
    fn kill(&self);

    /// Completes once the worker has exited, yielding its exit error (if any).
    async fn wait(&self) -> Result<(), TaskError>;
}

impl dyn Worker {
    /// Downcasts to the concrete worker type.
    pub fn downcast_ref<T: Worker>(&self) -> Option<&T> {
        <dyn Worker as AsAny>::as_any(self).downcast_ref::<T>()
    }
}
