//! TaskStore port - persistence of task records.
//!
//! The store is the source of truth for task state. The dispatch core
//! only ever talks to it through this trait; the in-memory and SQLite
//! implementations live in `impls`.

use async_trait::async_trait;

use crate::domain::{ResponseSummary, TaskId, TaskRecord, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(TaskId),

    #[error("{id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("corrupt row for {id}: {reason}")]
    Corrupt { id: TaskId, reason: String },

    #[error("column encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// TaskStore persists task records.
///
/// # Contract
/// - `add_task` assigns the id; the id on the passed record is ignored.
/// - Status writes must respect `TaskStatus::can_transition_to`.
/// - `update_task_response` records the response and moves the task to
///   `Done` in one write, so a stored task never has a response without
///   being `Done` (or the other way round).
/// - Concurrent writes to different tasks must be safe.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn add_task(&self, task: &TaskRecord) -> Result<TaskId, StoreError>;

    /// All tasks, ordered by id.
    async fn get_all_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Fails with `StoreError::NotFound` when absent.
    async fn get_task_by_id(&self, id: TaskId) -> Result<TaskRecord, StoreError>;

    /// Returns the number of deleted records (0 or 1).
    async fn delete_task_by_id(&self, id: TaskId) -> Result<u64, StoreError>;

    async fn update_task_status(
        &self,
        task: &TaskRecord,
        status: TaskStatus,
    ) -> Result<(), StoreError>;

    async fn update_task_response(
        &self,
        task: &TaskRecord,
        response: &ResponseSummary,
    ) -> Result<(), StoreError>;

    /// Remove every record.
    async fn clean_storage(&self) -> Result<(), StoreError>;
}
