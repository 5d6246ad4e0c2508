use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use thiserror::Error;

use crate::metrics::{HttpMonitor, RequestRecord};

/// Request timeout applied by the plain transport. Long enough for a
/// slow registry, short enough that a hung call ends the scenario.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// The pluggable send-one-request capability. The registry client is
/// constructed over a `dyn Transport`, which is where the
/// instrumentation slots in.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError>;
}

// ─── Plain transport ─────────────────────────────────────────────

/// Direct `reqwest` transport with connection pooling and the fixed
/// per-call timeout. One instance is shared by every scenario.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        Ok(self.client.execute(request).await?)
    }
}

// ─── Instrumented transport ──────────────────────────────────────

/// Decorator that times every call through the wrapped transport and
/// appends one `RequestRecord` to the monitor per attempt, success or
/// failure. Purely observational: the request goes through untouched
/// and the result is propagated unchanged.
///
/// All per-call state lives on the stack of `execute`, so a single
/// instance is safe to share across concurrent calls.
pub struct InstrumentedTransport {
    inner: Arc<dyn Transport>,
    monitor: Arc<HttpMonitor>,
    function: String,
}

impl InstrumentedTransport {
    pub fn new(
        inner: Arc<dyn Transport>,
        monitor: Arc<HttpMonitor>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            monitor,
            function: function.into(),
        }
    }
}

#[async_trait]
impl Transport for InstrumentedTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        // Snapshot the observable request state before handing it on
        let method = request.method().to_string();
        let url = request.url().to_string();
        let headers = snapshot_headers(request.headers());
        let request_bytes = declared_body_len(&request);

        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.inner.execute(request).await;
        let duration = start.elapsed();

        let (status, response_bytes, error) = match &result {
            Ok(response) => (
                Some(response.status().as_u16()),
                response_size(response),
                None,
            ),
            Err(e) => (None, None, Some(e.to_string())),
        };

        self.monitor.add(RequestRecord {
            method,
            url,
            headers,
            request_bytes,
            response_bytes,
            status,
            duration,
            started_at,
            error,
            function: self.function.clone(),
        });

        result
    }
}

// ─── Capture helpers ─────────────────────────────────────────────

/// Deep-copy the header map into owned strings so later mutation of
/// the live request cannot change the recorded snapshot.
fn snapshot_headers(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut snapshot: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        snapshot
            .entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or("<opaque>").to_string());
    }
    snapshot
}

/// Declared request body length; 0 when there is no body or its
/// length is not declared up front. No body-sniffing.
fn declared_body_len(request: &reqwest::Request) -> u64 {
    request
        .body()
        .and_then(|body| body.as_bytes())
        .map(|bytes| bytes.len() as u64)
        .unwrap_or(0)
}

/// Response size policy: the declared content length if reqwest knows
/// it, else a parsed `Content-Length` header, else unknown. `None` is
/// "unknown", never coerced to zero.
fn response_size(response: &reqwest::Response) -> Option<u64> {
    response.content_length().or_else(|| {
        response
            .headers()
            .get(CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    })
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, ACCEPT, USER_AGENT};

    /// Wrapped transport that never reaches the network.
    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn execute(
            &self,
            _request: reqwest::Request,
        ) -> Result<reqwest::Response, TransportError> {
            Err(TransportError::Unavailable("wire cut".into()))
        }
    }

    /// Wrapped transport answering with a canned response.
    struct CannedTransport {
        status: u16,
        content_length: Option<&'static str>,
        body: &'static str,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn execute(
            &self,
            _request: reqwest::Request,
        ) -> Result<reqwest::Response, TransportError> {
            let mut builder = http::Response::builder().status(self.status);
            if let Some(len) = self.content_length {
                builder = builder.header("content-length", len);
            }
            let response = builder.body(self.body).expect("canned response");
            Ok(reqwest::Response::from(response))
        }
    }

    fn get_request(url: &str) -> reqwest::Request {
        reqwest::Request::new(reqwest::Method::GET, url.parse().unwrap())
    }

    #[tokio::test]
    async fn failing_call_still_produces_exactly_one_record() {
        let monitor = Arc::new(HttpMonitor::new());
        let transport = InstrumentedTransport::new(
            Arc::new(FailingTransport),
            monitor.clone(),
            "doomed",
        );

        let result = transport.execute(get_request("http://localhost:1/x")).await;
        assert!(result.is_err());

        let records = monitor.all();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.function, "doomed");
        assert_eq!(record.status, None);
        assert_eq!(record.response_bytes, None);
        assert!(record.error.as_deref().unwrap().contains("wire cut"));
    }

    #[tokio::test]
    async fn error_is_propagated_unchanged() {
        let monitor = Arc::new(HttpMonitor::new());
        let transport =
            InstrumentedTransport::new(Arc::new(FailingTransport), monitor, "doomed");

        match transport.execute(get_request("http://localhost:1/x")).await {
            Err(TransportError::Unavailable(msg)) => assert_eq!(msg, "wire cut"),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_call_captures_status_and_size() {
        let monitor = Arc::new(HttpMonitor::new());
        let transport = InstrumentedTransport::new(
            Arc::new(CannedTransport {
                status: 200,
                content_length: Some("2"),
                body: "ok",
            }),
            monitor.clone(),
            "probe",
        );

        let mut request = get_request("http://localhost:8082/v2/");
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = transport.execute(request).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let records = monitor.all();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.method, "GET");
        assert_eq!(record.url, "http://localhost:8082/v2/");
        assert_eq!(record.status, Some(200));
        assert_eq!(record.headers["accept"], vec!["application/json"]);
        assert!(record.error.is_none());
        // A sized body means the size is known, one way or the other
        assert!(record.response_bytes.is_some());
    }

    #[test]
    fn header_snapshot_is_independent_of_the_live_map() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("probe/0.1"));
        headers.append(ACCEPT, HeaderValue::from_static("application/json"));

        let snapshot = snapshot_headers(&headers);

        // Mutate the live map after the snapshot was taken
        headers.insert(USER_AGENT, HeaderValue::from_static("rewritten/9.9"));
        headers.remove(ACCEPT);

        assert_eq!(snapshot["user-agent"], vec!["probe/0.1"]);
        assert_eq!(snapshot["accept"], vec!["application/json"]);
    }

    #[test]
    fn multi_valued_headers_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append(ACCEPT, HeaderValue::from_static("application/json"));
        headers.append(ACCEPT, HeaderValue::from_static("text/plain"));

        let snapshot = snapshot_headers(&headers);
        assert_eq!(snapshot["accept"], vec!["application/json", "text/plain"]);
    }

    #[test]
    fn get_request_has_no_declared_body() {
        let request = get_request("http://localhost:8082/v2/");
        assert_eq!(declared_body_len(&request), 0);
    }
}
