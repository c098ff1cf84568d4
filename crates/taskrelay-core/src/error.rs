use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{TaskId, TaskStatus};
use crate::ports::{DispatchError, StoreError};
use crate::queue::QueueError;

/// Errors surfaced to callers of the orchestrator.
///
/// Only admission is reported this way. What happens to a task after it
/// was queued is recorded in its status, never returned.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The workers are gone and the task never reached a terminal status.
    #[error("{id} left {status} after the workers stopped")]
    Unsettled { id: TaskId, status: TaskStatus },
}
