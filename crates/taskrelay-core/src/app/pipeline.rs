//! DispatchPipeline - what a worker does with one dequeued task.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{TaskRecord, TaskStatus};
use crate::ports::{DispatchClient, TaskStore};
use crate::queue::TaskHandler;

/// Drives a task through its lifecycle.
///
/// # Flow
/// 1. `New -> InProcess` (best effort)
/// 2. DispatchClient::send
/// 3. TaskStore::update_task_response, which also marks the task `Done`
/// 4. Any failure in 2 or 3 marks the task `Error`; nothing is retried
///
/// No failure leaves `handle`: every outcome ends up in the store or,
/// when the store itself fails, in the log.
pub struct DispatchPipeline {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<dyn DispatchClient>,
}

impl DispatchPipeline {
    pub fn new(store: Arc<dyn TaskStore>, dispatcher: Arc<dyn DispatchClient>) -> Self {
        Self { store, dispatcher }
    }

    /// A lost `InProcess` write only costs observability, so the
    /// dispatch goes ahead either way.
    async fn mark_in_process_best_effort(&self, task: &mut TaskRecord) {
        match self
            .store
            .update_task_status(task, TaskStatus::InProcess)
            .await
        {
            Ok(()) => task.mark_in_process(),
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "could not mark task in process, dispatching anyway");
            }
        }
    }

    async fn mark_error(&self, task: &mut TaskRecord) {
        match self.store.update_task_status(task, TaskStatus::Error).await {
            Ok(()) => task.mark_error(),
            Err(err) => {
                // the task keeps whatever status the store last accepted
                error!(task_id = %task.id, error = %err, "could not mark task as failed");
            }
        }
    }
}

#[async_trait]
impl TaskHandler for DispatchPipeline {
    async fn handle(&self, mut task: TaskRecord) {
        debug!(task_id = %task.id, method = %task.method, url = %task.url, "task picked up");
        self.mark_in_process_best_effort(&mut task).await;

        let summary = match self.dispatcher.send(&task).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "dispatch failed");
                self.mark_error(&mut task).await;
                return;
            }
        };

        match self.store.update_task_response(&task, &summary).await {
            Ok(()) => {
                info!(
                    task_id = %task.id,
                    status = %summary.status_text,
                    success = summary.is_success(),
                    "task done"
                );
                task.mark_done(summary);
            }
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "could not record response");
                self.mark_error(&mut task).await;
            }
        }
    }
}
