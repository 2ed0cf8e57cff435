//! Transports for the airsdk runtime.
//!
//! The runtime never speaks HTTP itself. It builds an [`ApiRequest`] and
//! hands it to a [`Transport`], which returns whatever status and body the
//! server produced. Only failures to obtain a response at all (timeouts,
//! connection errors) come back as `Err`; mapping statuses onto the error
//! taxonomy is the runtime's job.
//!
//! Two implementations ship here:
//!
//! - [`HttpTransport`]: reqwest over rustls, configured from
//!   [`airsdk_config::ClientConfig`].
//! - [`MemoryTransport`]: an in-process fake of the API for tests and
//!   offline use.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use airsdk_core::Result;

pub use airsdk_core::Method;

pub mod http;
pub mod memory;

pub use http::{HttpTransport, HttpTransportBuilder};
pub use memory::{CollectionRules, Injection, MemoryTransport, RecordedRequest};

/// One call to the API, relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API root, e.g. `simulations/abc/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Deadline for this call; the transport default applies when `None`.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post<P: Into<String>>(path: P, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn patch<P: Into<String>>(path: P, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete<P: Into<String>>(path: P) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_queries<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// First path segment, used as the metrics label.
    pub fn resource(&self) -> &str {
        self.path
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("_root")
    }
}

/// Status and body returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `None` for an empty or non-JSON body.
    pub body: Option<Value>,
    /// Raw body text, kept for error messages.
    pub text: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        let text = body.as_ref().map(Value::to_string).unwrap_or_default();
        Self { status, body, text }
    }

    /// Build a response from raw body text, parsing it as JSON when possible.
    pub fn from_text(status: u16, text: String) -> Self {
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };
        Self { status, body, text }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The external collaborator that moves requests to the API.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        (**self).send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_builders_fill_fields() {
        let req = ApiRequest::get("simulations/nodes/")
            .with_query("simulation", "sim-1")
            .with_queries([("limit", "10"), ("offset", "20")])
            .with_timeout(Some(Duration::from_secs(3)));

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.query.len(), 3);
        assert_eq!(req.resource(), "simulations");
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));
        assert!(req.body.is_none());

        let patch = ApiRequest::patch("images/i-1/", json!({"name": "x"}));
        assert_eq!(patch.body, Some(json!({"name": "x"})));
    }

    #[test]
    fn response_parses_json_text() {
        let resp = ApiResponse::from_text(200, "{\"id\": \"a\"}".to_string());
        assert_eq!(resp.body, Some(json!({"id": "a"})));
        assert!(resp.is_success());

        let empty = ApiResponse::from_text(204, String::new());
        assert!(empty.body.is_none());

        let html = ApiResponse::from_text(502, "<html>bad gateway</html>".to_string());
        assert!(html.body.is_none());
        assert!(!html.is_success());
        assert!(html.text.contains("bad gateway"));
    }
}
