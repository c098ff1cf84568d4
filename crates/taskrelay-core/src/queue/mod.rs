//! Queue module: bounded task buffer and the worker pool that drains it.

mod bounded;
mod pool;

pub use bounded::TaskQueue;

use async_trait::async_trait;
use std::future::Future;

use crate::domain::TaskRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("worker pool already started")]
    AlreadyStarted,

    #[error("queue is closed")]
    Closed,
}

/// Work done for one dequeued task.
///
/// The handler owns the record for the duration of the call. It has no way
/// to report failure back to the queue: whatever happens to the task has to
/// be recorded by the handler itself.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: TaskRecord);
}

/// Adapter so a plain async closure can be used as a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, task: TaskRecord) {
        (self.0)(task).await
    }
}
