//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a task.
///
/// State transitions:
/// - New -> InProcess -> Done
/// - New -> InProcess -> Error
///
/// `New` and the terminal states are stable; `InProcess` is only held while
/// a worker owns the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Stored and waiting in the queue.
    New,

    /// Dequeued by a worker, dispatch under way.
    InProcess,

    /// Dispatched and the response summary is recorded.
    Done,

    /// Dispatch or bookkeeping failed. Never retried.
    Error,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::New => 0,
            TaskStatus::InProcess => 1,
            TaskStatus::Done | TaskStatus::Error => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the observed history a
    /// subsequence of `New, InProcess, {Done|Error}`.
    ///
    /// `New -> Error` and `New -> Done` are allowed: they are what a store
    /// sees when the `InProcess` write was lost.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::InProcess => "in_process",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TaskStatus::New),
            "in_process" => Ok(TaskStatus::InProcess),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
