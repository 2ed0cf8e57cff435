//! reqwest-backed transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use url::Url;

use airsdk_config::{normalize_api_url, ClientConfig};
use airsdk_core::{AirError, Method, Result};
use airsdk_telemetry::MetricsRecorder;

use crate::{ApiRequest, ApiResponse, Transport};

/// Transport that issues real HTTP requests.
///
/// Authentication is an opaque bearer credential supplied at build time.
/// Timeouts come from [`airsdk_config::TimeoutConfig`]; a request may
/// shorten or extend its own deadline through [`ApiRequest::timeout`].
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    read_timeout: Duration,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    in_flight: AtomicU64,
}

impl HttpTransport {
    /// Build a transport from the loaded configuration.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        HttpTransportBuilder::from_config(cfg).build()
    }

    pub fn builder<S: Into<String>>(base_url: S) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    /// Normalised API root every request path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path)
                .map_err(|e| AirError::invalid_argument(format!("invalid URL '{path}': {e}")));
        }
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AirError::invalid_argument(format!("invalid request path '{path}': {e}")))
    }

    fn map_error(&self, err: reqwest::Error, timeout: Option<Duration>) -> AirError {
        if err.is_timeout() {
            AirError::Timeout(timeout.unwrap_or(self.read_timeout))
        } else if err.is_connect() {
            AirError::Transport(err.to_string())
        } else {
            AirError::HttpClient(err)
        }
    }

    fn error_kind(err: &reqwest::Error) -> &'static str {
        if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_decode() || err.is_body() {
            "decode"
        } else {
            "request"
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path)?;
        let resource = request.resource().to_string();
        let method = request.method.as_str();

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url)
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        tracing::debug!(method, path = %request.path, "sending API request");

        if let Some(metrics) = &self.metrics {
            metrics.record_request_start(&resource, method);
            metrics.set_in_flight(self.in_flight.fetch_add(1, Ordering::Relaxed) + 1);
        }
        let started = Instant::now();

        let outcome = match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                resp.text()
                    .await
                    .map(|text| ApiResponse::from_text(status, text))
            }
            Err(err) => Err(err),
        };

        if let Some(metrics) = &self.metrics {
            metrics.set_in_flight(self.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1));
        }

        match outcome {
            Ok(response) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_request_end(
                        &resource,
                        method,
                        response.is_success(),
                        Some(started.elapsed().as_secs_f64()),
                    );
                }
                if !response.is_success() {
                    tracing::debug!(
                        method,
                        path = %request.path,
                        status = response.status,
                        "API returned non-success status"
                    );
                }
                Ok(response)
            }
            Err(err) => {
                tracing::warn!("API request {} {} failed: {}", method, request.path, err);
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(&resource, Self::error_kind(&err));
                }
                Err(self.map_error(err, request.timeout))
            }
        }
    }
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    base_url: String,
    credential: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl HttpTransportBuilder {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            credential: None,
            connect_timeout: Duration::from_secs(airsdk_config::DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(airsdk_config::DEFAULT_READ_TIMEOUT_SECS),
            metrics: None,
        }
    }

    /// Builder preloaded with the URL, timeouts and credential of `cfg`.
    pub fn from_config(cfg: &ClientConfig) -> Self {
        let mut builder = Self::new(cfg.api.url.clone())
            .with_connect_timeout(cfg.timeouts.connect())
            .with_read_timeout(cfg.timeouts.read());
        if let Some(credential) = cfg.api.credential() {
            builder = builder.with_credential(credential);
        }
        builder
    }

    /// Bearer token sent on every request.
    pub fn with_credential<S: Into<String>>(mut self, credential: S) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Attach a shared `MetricsRecorder` for per-request metrics.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let base_url = normalize_api_url(&self.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(credential) = &self.credential {
            let mut value = HeaderValue::from_str(&format!("Bearer {credential}")).map_err(|_| {
                AirError::invalid_config("api.api_key", "credential contains invalid header characters")
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("airsdk/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()?;

        Ok(HttpTransport {
            client,
            base_url,
            read_timeout: self.read_timeout,
            metrics: self.metrics,
            in_flight: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_normalises_base_url() {
        let transport = HttpTransport::builder("https://air.example.com")
            .with_credential("token")
            .build()
            .expect("build transport");
        assert_eq!(transport.base_url().as_str(), "https://air.example.com/api/v3/");
    }

    #[test]
    fn paths_join_under_api_root() {
        let transport = HttpTransport::builder("https://air.example.com/api/v2")
            .build()
            .expect("build transport");
        assert_eq!(
            transport.url_for("/simulations/nodes/").unwrap().as_str(),
            "https://air.example.com/api/v2/simulations/nodes/"
        );
        assert_eq!(
            transport
                .url_for("https://other.example.com/api/v2/images/?offset=5")
                .unwrap()
                .as_str(),
            "https://other.example.com/api/v2/images/?offset=5"
        );
    }

    #[test]
    fn invalid_credential_is_config_error() {
        let err = HttpTransport::builder("https://air.example.com")
            .with_credential("bad\ntoken")
            .build()
            .err()
            .expect("newline in header must fail");
        assert!(matches!(err, AirError::InvalidConfig { .. }));
    }

    #[test]
    fn from_config_uses_configured_timeouts() {
        let cfg = airsdk_config::load_from_str("[timeouts]\nread_secs = 7\n").expect("parse");
        let transport = HttpTransport::from_config(&cfg).expect("build transport");
        assert_eq!(transport.read_timeout, Duration::from_secs(7));
    }

    #[test]
    fn config_builder_keeps_metrics_recorder() {
        let cfg = airsdk_config::load_from_str("[timeouts]\nread_secs = 9\n").expect("parse");
        let transport = HttpTransportBuilder::from_config(&cfg)
            .with_metrics(Arc::new(airsdk_telemetry::NoopMetricsRecorder))
            .build()
            .expect("build transport");
        assert!(transport.metrics.is_some());
        assert_eq!(transport.read_timeout, Duration::from_secs(9));
    }
}
