//! # Closure-backed worker (`TaskWorker`)
//!
//! [`TaskWorker`] spawns a future built from a closure `F: FnOnce(CancellationToken) -> Fut`
//! onto the Tokio runtime and exposes it as a [`Worker`]:
//! - [`Worker::kill`] cancels the token handed to the closure;
//! - [`Worker::wait`] resolves with the future's output, any number of times;
//! - a panicking body is reported as [`TaskError::Fail`].
//!
//! A worker may carry a typed resource (`R`) for its manifold's output routine to hand
//! out to dependents.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use depvisor::{TaskError, TaskWorker, WorkerRef};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let w: WorkerRef = TaskWorker::spawn(|ctx: CancellationToken| async move {
//!     ctx.cancelled().await;
//!     Err::<(), _>(TaskError::Canceled)
//! });
//! w.kill();
//! assert_eq!(w.wait().await, Err(TaskError::Canceled));
//! # }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::worker::Worker;

type Outcome = Option<Result<(), TaskError>>;

/// Function-backed worker with an optional attached resource.
pub struct TaskWorker<R = ()> {
    token: CancellationToken,
    done: watch::Receiver<Outcome>,
    resource: R,
}

impl TaskWorker<()> {
    /// Spawns `f` and returns the running worker.
    pub fn spawn<F, Fut>(f: F) -> Arc<Self>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self::with_resource((), f)
    }
}

impl<R: Send + Sync + 'static> TaskWorker<R> {
    /// Spawns `f` and attaches `resource` to the running worker.
    pub fn with_resource<F, Fut>(resource: R, f: F) -> Arc<Self>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (tx, done) = watch::channel::<Outcome>(None);
        let body = f(token.clone());

        tokio::spawn(async move {
            let res = match AssertUnwindSafe(body).catch_unwind().await {
                Ok(res) => res,
                Err(panic) => Err(TaskError::fail(format!(
                    "worker panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            tx.send_replace(Some(res));
        });

        Arc::new(Self {
            token,
            done,
            resource,
        })
    }

    /// The resource attached at spawn time.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// True once a stop was requested.
    pub fn is_killed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the body has returned.
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }
}

#[async_trait]
impl<R: Send + Sync + 'static> Worker for TaskWorker<R> {
    fn kill(&self) {
        self.token.cancel();
    }

    async fn wait(&self) -> Result<(), TaskError> {
        let mut rx = self.done.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            // The runtime dropped the body before it finished.
            Err(_) => Err(TaskError::Canceled),
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::WorkerRef;

    #[tokio::test]
    async fn kill_cancels_the_body() {
        let w = TaskWorker::spawn(|ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Ok(())
        });
        assert!(!w.is_killed());
        w.kill();
        w.kill();
        assert_eq!(w.wait().await, Ok(()));
        assert!(w.is_killed());
        assert!(w.is_finished());
    }

    #[tokio::test]
    async fn wait_repeats_the_same_outcome() {
        let w: WorkerRef =
            TaskWorker::spawn(|_ctx| async { Err::<(), _>(TaskError::fail("boom")) });
        assert_eq!(w.wait().await, Err(TaskError::fail("boom")));
        assert_eq!(w.wait().await, Err(TaskError::fail("boom")));
    }

    #[tokio::test]
    async fn panic_is_reported_as_failure() {
        let w = TaskWorker::spawn(|_ctx| async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        assert_eq!(
            w.wait().await,
            Err(TaskError::fail("worker panicked: kaboom"))
        );
    }

    #[tokio::test]
    async fn resource_is_reachable_through_downcast() {
        let w: WorkerRef = TaskWorker::with_resource(42u32, |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Ok(())
        });
        let concrete = w.downcast_ref::<TaskWorker<u32>>().map(|w| *w.resource());
        assert_eq!(concrete, Some(42));
        assert!(w.downcast_ref::<TaskWorker<String>>().is_none());
        w.kill();
        assert_eq!(w.wait().await, Ok(()));
    }
}
