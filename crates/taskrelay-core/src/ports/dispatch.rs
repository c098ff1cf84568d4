//! DispatchClient port - performs the outbound HTTP call of a task.
//!
//! A dispatch client knows nothing about the queue or the store. It turns
//! one task into one response summary (or one failure); all status
//! bookkeeping belongs to the caller.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{ResponseSummary, TaskRecord};

/// Default per-call bound (connect + send + response headers).
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The request could not be built (method, URL or header rejected).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Connecting or sending failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Headers arrived but the body could not be read.
    #[error("reading response body failed: {0}")]
    Body(String),
}

impl DispatchError {
    /// True for failures that happened before anything was sent.
    pub fn is_construction(&self) -> bool {
        matches!(self, DispatchError::InvalidRequest(_))
    }
}

#[async_trait]
pub trait DispatchClient: Send + Sync {
    async fn send(&self, task: &TaskRecord) -> Result<ResponseSummary, DispatchError>;
}
