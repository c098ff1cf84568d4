//! Task record: what to send, and how far it got.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ResponseSummary, TaskId, TaskStatus};

/// Request headers of a task. Keys are unique.
pub type RequestHeaders = BTreeMap<String, String>;

/// What a caller submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: RequestHeaders,
}

impl TaskSpec {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: RequestHeaders::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A task and its lifecycle state.
///
/// Design:
/// - `method`, `url` and `headers` never change after creation.
/// - `status` and `response` are only changed by the dispatch pipeline,
///   and `response` is present exactly when `status == Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: RequestHeaders,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// New, not yet stored record. The method is upper-cased so stored
    /// records compare equal however the caller spelled it.
    pub fn from_spec(spec: TaskSpec) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::UNASSIGNED,
            method: spec.method.trim().to_ascii_uppercase(),
            url: spec.url.trim().to_string(),
            headers: spec.headers,
            status: TaskStatus::New,
            response: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Mark as in process (worker picked it up).
    pub fn mark_in_process(&mut self) {
        self.status = TaskStatus::InProcess;
        self.touch();
    }

    /// Mark as done, recording the response.
    pub fn mark_done(&mut self, response: ResponseSummary) {
        self.status = TaskStatus::Done;
        self.response = Some(response);
        self.touch();
    }

    /// Mark as failed. Any response is dropped to keep `response` tied to `Done`.
    pub fn mark_error(&mut self) {
        self.status = TaskStatus::Error;
        self.response = None;
        self.touch();
    }

    /// Apply a plain status change (no response).
    pub fn set_status(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Error => self.mark_error(),
            other => {
                self.status = other;
                self.touch();
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
