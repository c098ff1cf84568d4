//! Worker pool: N tokio tasks sharing one receiver.
//!
//! handler は 1 件ごとに spawn する。panic してもワーカーは止まらない。

use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::TaskHandler;
use crate::domain::TaskRecord;

pub(super) type SharedReceiver = Arc<Mutex<mpsc::Receiver<TaskRecord>>>;

/// Handle to the running workers.
/// - Workers stop on their own once the channel is closed and drained.
/// - `join()` waits for all of them.
pub(super) struct WorkerPool {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers. Must be called from inside a tokio runtime.
    pub(super) fn spawn(
        n: usize,
        receiver: SharedReceiver,
        buffered: Arc<AtomicIsize>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let rx = Arc::clone(&receiver);
            let buffered = Arc::clone(&buffered);
            let handler = Arc::clone(&handler);

            let join = tokio::spawn(async move {
                worker_loop(worker_id, rx, buffered, handler).await;
            });
            joins.push(join);
        }

        Self { joins }
    }

    pub(super) fn len(&self) -> usize {
        self.joins.len()
    }

    /// Wait for every worker to exit.
    pub(super) async fn join(self) {
        for join in self.joins {
            if let Err(err) = join.await {
                error!(error = %err, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: SharedReceiver,
    buffered: Arc<AtomicIsize>,
    handler: Arc<dyn TaskHandler>,
) {
    debug!(worker = worker_id, "worker started");
    loop {
        // Only the hand-off is serialised; the lock is released before the
        // handler runs.
        let next = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };

        let Some(task) = next else {
            // closed and drained
            break;
        };
        buffered.fetch_sub(1, Ordering::SeqCst);

        let task_id = task.id;
        let handler = Arc::clone(&handler);

        // Run the handler in its own task so a panic is contained to this
        // one invocation and the worker keeps draining.
        let outcome = tokio::spawn(async move { handler.handle(task).await }).await;
        if let Err(err) = outcome {
            if err.is_panic() {
                error!(worker = worker_id, %task_id, "task handler panicked");
            } else {
                warn!(worker = worker_id, %task_id, error = %err, "task handler was cancelled");
            }
        }
    }
    debug!(worker = worker_id, "worker stopped");
}
