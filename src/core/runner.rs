//! # Start attempts, exit watchers and restart timers.
//!
//! Everything the engine loop must not wait on inline runs here as a spawned task
//! that reports back through the loop's inbox:
//!
//! ```text
//! spawn_start(name, ticket)   manifold.start(resolver).await ──► Message::Started
//! spawn_watch(name, ticket)   worker.wait().await            ──► Message::Exited
//! schedule_retry(name, id)    sleep(delay).await             ──► Message::RetryDue
//! ```
//!
//! ## Rules
//! - Each message carries the ticket (or retry id) it was spawned for; the loop drops
//!   results that no longer match the record.
//! - A panicking start routine is reported as [`TaskError::Fail`].
//! - A closed inbox means the loop is gone; results are dropped. A worker started
//!   after that point is killed so it does not outlive the engine.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::core::actor::Message;
use crate::core::resolver::Resolver;
use crate::error::TaskError;
use crate::tasks::{Manifold, WorkerRef, panic_message};

/// Runs one start routine and reports its outcome.
pub(crate) fn spawn_start(
    inbox: mpsc::UnboundedSender<Message>,
    name: String,
    ticket: u64,
    manifold: Manifold,
    resolver: Resolver,
) {
    tokio::spawn(async move {
        let attempt = async move { manifold.start(resolver).await };
        let result = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(TaskError::fail(format!(
                "start routine panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        if let Err(mpsc::error::SendError(msg)) = inbox.send(Message::Started {
            name,
            ticket,
            result,
        }) {
            if let Message::Started {
                result: Ok(worker), ..
            } = msg
            {
                worker.kill();
            }
        }
    });
}

/// Waits for `worker` to exit and reports how.
pub(crate) fn spawn_watch(
    inbox: mpsc::UnboundedSender<Message>,
    name: String,
    ticket: u64,
    worker: WorkerRef,
) {
    tokio::spawn(async move {
        let result = worker.wait().await;
        let _ = inbox.send(Message::Exited {
            name,
            ticket,
            result,
        });
    });
}

/// Reports `RetryDue` for `name` after `delay`.
pub(crate) fn schedule_retry(
    inbox: mpsc::UnboundedSender<Message>,
    name: String,
    retry: u64,
    delay: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = inbox.send(Message::RetryDue { name, retry });
    });
}
