//! TaskOrchestrator - the admission surface of the relay.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::app::DispatchPipeline;
use crate::config::RelayConfig;
use crate::domain::{TaskId, TaskRecord, TaskSpec, TaskStatus};
use crate::error::RelayError;
use crate::impls::{HttpDispatchClient, InMemoryTaskStore, SqliteTaskStore};
use crate::ports::{DispatchClient, TaskStore};
use crate::queue::{QueueError, TaskQueue};

/// Owns the store, the dispatch client and the queue. Built once at
/// startup and shared by handle (`Arc<TaskOrchestrator>`).
///
/// # Flow
/// 1. `create_task`: store the record as `New`, then enqueue it
/// 2. a worker runs the `DispatchPipeline` on it
/// 3. callers observe progress through the store pass-throughs
pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<dyn DispatchClient>,
    queue: Arc<TaskQueue>,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<dyn DispatchClient>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            queue,
        }
    }

    /// Wire the production collaborators: SQLite when a database URL is
    /// configured (in memory otherwise) and the HTTP dispatch client.
    /// Workers are not started.
    pub async fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;

        let store: Arc<dyn TaskStore> = match &config.database_url {
            Some(url) => Arc::new(SqliteTaskStore::connect(url).await?),
            None => Arc::new(InMemoryTaskStore::new()),
        };
        let dispatcher = Arc::new(HttpDispatchClient::new(config.dispatch_timeout)?);
        let queue = Arc::new(TaskQueue::new(config.queue_capacity)?);

        info!(
            capacity = config.queue_capacity,
            persistent = config.database_url.is_some(),
            timeout_secs = config.dispatch_timeout.as_secs(),
            "orchestrator ready"
        );
        Ok(Self::new(store, dispatcher, queue))
    }

    /// Store a new task and queue it for dispatch.
    ///
    /// Suspends while the queue is full. A task that could not be stored is
    /// never queued; a task stored but refused by a closed queue is marked
    /// `Error` so it does not sit in `New` forever.
    pub async fn create_task(&self, spec: TaskSpec) -> Result<TaskId, RelayError> {
        let record = TaskRecord::from_spec(spec);
        let id = self.store.add_task(&record).await?;
        let record = record.with_id(id);
        debug!(task_id = %id, method = %record.method, url = %record.url, "task created");

        match self.queue.enqueue(record.clone()).await {
            Ok(()) => Ok(id),
            Err(QueueError::Closed) => {
                if let Err(err) = self
                    .store
                    .update_task_status(&record, TaskStatus::Error)
                    .await
                {
                    warn!(task_id = %id, error = %err, "could not fail task refused by closed queue");
                }
                Err(QueueError::Closed.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Start `worker_count` workers running the dispatch pipeline. Once only.
    pub fn init_workers(&self, worker_count: usize) -> Result<(), RelayError> {
        let pipeline = DispatchPipeline::new(Arc::clone(&self.store), Arc::clone(&self.dispatcher));
        self.queue.start(worker_count, Arc::new(pipeline))?;
        Ok(())
    }

    /// Stop admission, drain what is queued and wait for the workers.
    ///
    /// If the workers were never started, whatever was still queued is
    /// marked `Error` instead: nothing could dispatch it any more.
    pub async fn shutdown(&self) {
        info!(pending = self.queue.size(), "shutting down");
        for task in self.queue.close().await {
            match self.store.update_task_status(&task, TaskStatus::Error).await {
                Ok(()) => warn!(task_id = %task.id, "task never dispatched, marked as failed"),
                Err(err) => {
                    error!(task_id = %task.id, error = %err, "could not fail undispatched task");
                }
            }
        }
    }

    /// Advisory number of queued tasks not yet picked up.
    pub fn pending_tasks(&self) -> usize {
        self.queue.size()
    }

    pub async fn get_all_tasks(&self) -> Result<Vec<TaskRecord>, RelayError> {
        Ok(self.store.get_all_tasks().await?)
    }

    pub async fn get_task_by_id(&self, id: TaskId) -> Result<TaskRecord, RelayError> {
        Ok(self.store.get_task_by_id(id).await?)
    }

    pub async fn delete_task_by_id(&self, id: TaskId) -> Result<u64, RelayError> {
        Ok(self.store.delete_task_by_id(id).await?)
    }

    pub async fn clean_storage(&self) -> Result<(), RelayError> {
        Ok(self.store.clean_storage().await?)
    }

    /// Poll the store every `poll` until the task is terminal.
    ///
    /// Gives up with `RelayError::Unsettled` once shutdown has completed and
    /// the task is still not terminal (its last status write was lost).
    pub async fn wait_for_terminal(
        &self,
        id: TaskId,
        poll: Duration,
    ) -> Result<TaskRecord, RelayError> {
        loop {
            // checked before the read: if the workers were already gone,
            // the status read below is final
            let finished = self.queue.is_finished();
            let task = self.store.get_task_by_id(id).await?;
            if task.is_terminal() {
                return Ok(task);
            }
            if finished {
                return Err(RelayError::Unsettled {
                    id,
                    status: task.status,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }
}
