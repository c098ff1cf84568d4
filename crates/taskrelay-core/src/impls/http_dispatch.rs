//! HttpDispatchClient - the production DispatchClient, backed by reqwest.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::time::Duration;
use tracing::debug;

use crate::domain::{HeaderMultiMap, ResponseSummary, TaskRecord};
use crate::ports::{DispatchClient, DispatchError};

/// Sends a task as a bodiless HTTP request and reads the whole response.
///
/// # Timeout
/// One fixed bound, set at construction, covers connecting, sending the
/// request and receiving the response headers. Reading the body gets a
/// second window of the same length; running out there is reported as a
/// body failure, not a timeout, because the endpoint did answer.
pub struct HttpDispatchClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDispatchClient {
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(format!("building http client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn build_request(&self, task: &TaskRecord) -> Result<reqwest::Request, DispatchError> {
        let method = Method::from_bytes(task.method.as_bytes())
            .map_err(|_| DispatchError::InvalidRequest(format!("method {:?}", task.method)))?;

        let url = Url::parse(&task.url)
            .map_err(|e| DispatchError::InvalidRequest(format!("url {:?}: {e}", task.url)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
            return Err(DispatchError::InvalidRequest(format!(
                "url {:?}: only absolute http(s) urls can be dispatched",
                task.url
            )));
        }

        let mut headers = HeaderMap::with_capacity(task.headers.len());
        for (name, value) in &task.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| DispatchError::InvalidRequest(format!("header name {name:?}")))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                DispatchError::InvalidRequest(format!("header value for {name}"))
            })?;
            headers.insert(name, value);
        }

        self.client
            .request(method, url)
            .headers(headers)
            .build()
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl DispatchClient for HttpDispatchClient {
    async fn send(&self, task: &TaskRecord) -> Result<ResponseSummary, DispatchError> {
        let request = self.build_request(task)?;

        let response = match tokio::time::timeout(self.timeout, self.client.execute(request)).await
        {
            Err(_) => return Err(DispatchError::Timeout(self.timeout)),
            Ok(Err(err)) if err.is_timeout() => return Err(DispatchError::Timeout(self.timeout)),
            Ok(Err(err)) => return Err(DispatchError::Transport(error_chain(&err))),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        let status_text = ResponseSummary::status_line(status.as_u16(), status.canonical_reason());
        let content_length = ResponseSummary::content_length_from(response.content_length());
        let headers = collect_headers(response.headers());
        debug!(task_id = %task.id, status = %status_text, "response headers received");

        let body = match tokio::time::timeout(self.timeout, response.bytes()).await {
            Err(_) => {
                return Err(DispatchError::Body(format!(
                    "body not complete within {:?}",
                    self.timeout
                )));
            }
            Ok(Err(err)) => return Err(DispatchError::Body(error_chain(&err))),
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        };

        Ok(ResponseSummary {
            status_text,
            status_code: status.as_u16(),
            headers,
            content_length,
            body,
        })
    }
}

/// Flatten a header map keeping every value of repeated headers in order.
pub(crate) fn collect_headers(map: &HeaderMap) -> HeaderMultiMap {
    let mut out = HeaderMultiMap::new();
    for (name, value) in map {
        out.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

/// reqwest's top-level message is often just "error sending request";
/// the cause underneath is what is worth logging.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskSpec};
    use crate::ports::DEFAULT_DISPATCH_TIMEOUT;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn task(spec: TaskSpec) -> TaskRecord {
        TaskRecord::from_spec(spec).with_id(TaskId::new(1))
    }

    fn client(timeout: Duration) -> HttpDispatchClient {
        HttpDispatchClient::new(timeout).unwrap()
    }

    #[tokio::test]
    async fn successful_call_is_summarised() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/status")
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"ok"}"#)
            .create_async()
            .await;

        let spec = TaskSpec::new("GET", format!("{}/status", server.url()))
            .with_header("X-Api-Key", "secret");
        let summary = client(Duration::from_secs(5))
            .send(&task(spec))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(summary.status_code, 200);
        assert_eq!(summary.status_text, "200 OK");
        assert_eq!(summary.body, r#"{"message":"ok"}"#);
        assert_eq!(summary.headers["content-type"], vec!["application/json"]);
    }

    #[tokio::test]
    async fn non_2xx_is_still_a_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/missing")
            .with_status(404)
            .with_body("nope")
            .create_async()
            .await;

        let spec = TaskSpec::new("DELETE", format!("{}/missing", server.url()));
        let summary = client(Duration::from_secs(5))
            .send(&task(spec))
            .await
            .unwrap();

        assert_eq!(summary.status_code, 404);
        assert_eq!(summary.status_text, "404 Not Found");
        assert!(!summary.is_success());
        assert_eq!(summary.body, "nope");
    }

    #[tokio::test]
    async fn request_is_sent_without_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body("")
            .with_status(201)
            .create_async()
            .await;

        let spec = TaskSpec::new("post", format!("{}/hook", server.url()));
        let summary = client(Duration::from_secs(5))
            .send(&task(spec))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(summary.status_code, 201);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // nothing listens on port 1
        let spec = TaskSpec::new("GET", "http://127.0.0.1:1/");
        let err = client(Duration::from_secs(5))
            .send(&task(spec))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                // accept and never answer
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let spec = TaskSpec::new("GET", format!("http://{addr}/slow"));
        let err = client(Duration::from_millis(200))
            .send(&task(spec))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Timeout(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn short_body_is_a_body_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // promise 100 bytes, send 5, hang up
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                .await
                .unwrap();
        });

        let spec = TaskSpec::new("GET", format!("http://{addr}/cut"));
        let err = client(Duration::from_secs(5))
            .send(&task(spec))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Body(_)), "got {err:?}");
    }

    #[rstest]
    #[case(TaskSpec::new("BAD METHOD", "http://example.com"))]
    #[case(TaskSpec::new("GET", "not a url"))]
    #[case(TaskSpec::new("GET", "ftp://example.com/file"))]
    #[case(TaskSpec::new("GET", "http://example.com").with_header("bad header", "x"))]
    #[case(TaskSpec::new("GET", "http://example.com").with_header("X-Ok", "line\nbreak"))]
    #[tokio::test]
    async fn malformed_tasks_fail_before_sending(#[case] spec: TaskSpec) {
        let err = client(DEFAULT_DISPATCH_TIMEOUT)
            .send(&task(spec))
            .await
            .unwrap_err();
        assert!(err.is_construction(), "got {err:?}");
    }

    #[test]
    fn repeated_headers_keep_every_value_in_order() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));
        map.insert("content-type", HeaderValue::from_static("text/plain"));

        let headers = collect_headers(&map);
        assert_eq!(headers["set-cookie"], vec!["a=1", "b=2"]);
        assert_eq!(headers["content-type"], vec!["text/plain"]);
    }
}
