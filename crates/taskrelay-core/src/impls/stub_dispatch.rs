//! StubDispatchClient - scripted DispatchClient for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::{HeaderMultiMap, ResponseSummary, TaskId, TaskRecord};
use crate::ports::{DispatchClient, DispatchError};

/// Answers by URL from a fixed table; unknown URLs get the default reply.
///
/// # Example
/// ```ignore
/// let client = StubDispatchClient::new()
///     .respond("http://svc/ok", StubDispatchClient::ok("{}"))
///     .fail("http://svc/down", DispatchError::Transport("refused".into()));
/// ```
pub struct StubDispatchClient {
    replies: HashMap<String, Result<ResponseSummary, DispatchError>>,
    default_reply: Result<ResponseSummary, DispatchError>,
    delay: Duration,
    sent: Mutex<Vec<TaskId>>,
}

impl StubDispatchClient {
    /// Every URL fails with a transport error until told otherwise.
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            default_reply: Err(DispatchError::Transport("no stub reply configured".into())),
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A `200 OK` summary with the given body.
    pub fn ok(body: impl Into<String>) -> ResponseSummary {
        let body = body.into();
        ResponseSummary {
            status_text: "200 OK".to_string(),
            status_code: 200,
            headers: HeaderMultiMap::new(),
            content_length: body.len() as i64,
            body,
        }
    }

    pub fn respond(mut self, url: impl Into<String>, summary: ResponseSummary) -> Self {
        self.replies.insert(url.into(), Ok(summary));
        self
    }

    pub fn fail(mut self, url: impl Into<String>, error: DispatchError) -> Self {
        self.replies.insert(url.into(), Err(error));
        self
    }

    pub fn with_default(mut self, reply: Result<ResponseSummary, DispatchError>) -> Self {
        self.default_reply = reply;
        self
    }

    /// Simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Ids of the tasks sent so far, in call order.
    pub async fn sent(&self) -> Vec<TaskId> {
        self.sent.lock().await.clone()
    }
}

impl Default for StubDispatchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchClient for StubDispatchClient {
    async fn send(&self, task: &TaskRecord) -> Result<ResponseSummary, DispatchError> {
        self.sent.lock().await.push(task.id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .get(&task.url)
            .unwrap_or(&self.default_reply)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskSpec;

    fn task(id: i64, url: &str) -> TaskRecord {
        TaskRecord::from_spec(TaskSpec::new("GET", url)).with_id(TaskId::new(id))
    }

    #[tokio::test]
    async fn replies_by_url_and_records_calls() {
        let client = StubDispatchClient::new()
            .respond("http://svc/ok", StubDispatchClient::ok("fine"))
            .fail("http://svc/down", DispatchError::Transport("refused".into()));

        let ok = client.send(&task(1, "http://svc/ok")).await.unwrap();
        assert_eq!(ok.body, "fine");
        assert_eq!(ok.content_length, 4);

        let down = client.send(&task(2, "http://svc/down")).await.unwrap_err();
        assert_eq!(down, DispatchError::Transport("refused".into()));

        let unknown = client.send(&task(3, "http://svc/other")).await;
        assert!(unknown.is_err());

        assert_eq!(
            client.sent().await,
            vec![TaskId::new(1), TaskId::new(2), TaskId::new(3)]
        );
    }
}
