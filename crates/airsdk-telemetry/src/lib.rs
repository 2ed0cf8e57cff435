//! Logging initialisation and request metrics for airsdk.
//!
//! [`init`] installs the global `tracing` subscriber. [`MetricsRecorder`] is
//! the seam the HTTP transport reports request outcomes through; the default
//! is [`NoopMetricsRecorder`], and a Prometheus-backed recorder is available
//! behind the `prometheus` feature.

use std::env;
use std::str::FromStr;

use time::{format_description, UtcOffset};
use tracing::Level;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;

#[cfg(feature = "prometheus")]
pub use crate::prometheus_impl::PrometheusMetricsRecorder;

/// Error type for telemetry initialisation failures.
///
/// Kept independent of `airsdk-core` so the crate can be used on its own.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Provided log level string could not be parsed.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to configure the subscriber (should be rare).
    #[error("failed to init telemetry: {0}")]
    SubscriberInit(String),

    /// Metrics registry rejected a collector.
    #[error("failed to register metric: {0}")]
    Metrics(String),
}

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Interface for recording API request metrics.
///
/// `resource` is the first path segment of the request (`simulations`,
/// `images`, ...), `method` the HTTP verb.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Record that a request has been handed to the transport.
    fn record_request_start(&self, resource: &str, method: &str);

    /// Record that a request has completed.
    ///
    /// - `success`: whether a 2xx status came back.
    /// - `latency_secs`: wall time between send and response, if measured.
    fn record_request_end(
        &self,
        resource: &str,
        method: &str,
        success: bool,
        latency_secs: Option<f64>,
    );

    /// Record a transport-level error.
    ///
    /// `kind` is a short, stable string (`"timeout"`, `"connect"`, `"decode"`).
    fn record_error(&self, resource: &str, kind: &str);

    /// Record the number of requests currently in flight.
    fn set_in_flight(&self, count: u64);
}

/// A no-op metrics recorder that does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn record_request_start(&self, _resource: &str, _method: &str) {}

    fn record_request_end(
        &self,
        _resource: &str,
        _method: &str,
        _success: bool,
        _latency_secs: Option<f64>,
    ) {
    }

    fn record_error(&self, _resource: &str, _kind: &str) {}

    fn set_in_flight(&self, _count: u64) {}
}

#[cfg(feature = "prometheus")]
pub mod prometheus_impl {
    use super::*;
    use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

    /// Prometheus-backed metrics recorder.
    #[derive(Clone)]
    pub struct PrometheusMetricsRecorder {
        registry: Registry,
        requests_total: IntCounterVec,
        request_latency_seconds: HistogramVec,
        in_flight: IntGauge,
        errors_total: IntCounterVec,
    }

    impl PrometheusMetricsRecorder {
        /// Create a new recorder with a fresh registry.
        pub fn new() -> Result<Self> {
            let registry = Registry::new();

            let requests_total = IntCounterVec::new(
                Opts::new("requests_total", "Total number of API requests issued")
                    .namespace("airsdk"),
                &["resource", "method", "success"],
            )
            .map_err(metrics_err)?;
            registry
                .register(Box::new(requests_total.clone()))
                .map_err(metrics_err)?;

            let request_latency_seconds = HistogramVec::new(
                HistogramOpts::new("request_latency_seconds", "API request latency in seconds")
                    .namespace("airsdk"),
                &["resource", "method"],
            )
            .map_err(metrics_err)?;
            registry
                .register(Box::new(request_latency_seconds.clone()))
                .map_err(metrics_err)?;

            let in_flight = IntGauge::with_opts(
                Opts::new("requests_in_flight", "API requests currently awaiting a response")
                    .namespace("airsdk"),
            )
            .map_err(metrics_err)?;
            registry
                .register(Box::new(in_flight.clone()))
                .map_err(metrics_err)?;

            let errors_total = IntCounterVec::new(
                Opts::new("errors_total", "Transport errors by kind").namespace("airsdk"),
                &["resource", "kind"],
            )
            .map_err(metrics_err)?;
            registry
                .register(Box::new(errors_total.clone()))
                .map_err(metrics_err)?;

            Ok(Self {
                registry,
                requests_total,
                request_latency_seconds,
                in_flight,
                errors_total,
            })
        }

        /// Access the underlying Prometheus registry.
        pub fn registry(&self) -> &Registry {
            &self.registry
        }

        /// Encode all metrics in the Prometheus text exposition format.
        pub fn encode_text(&self) -> Result<String> {
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            encoder
                .encode(&self.registry.gather(), &mut buffer)
                .map_err(metrics_err)?;
            String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
        }
    }

    fn metrics_err(err: prometheus::Error) -> TelemetryError {
        TelemetryError::Metrics(err.to_string())
    }

    impl MetricsRecorder for PrometheusMetricsRecorder {
        fn record_request_start(&self, _resource: &str, _method: &str) {
            // in_flight is maintained by the caller through set_in_flight.
        }

        fn record_request_end(
            &self,
            resource: &str,
            method: &str,
            success: bool,
            latency_secs: Option<f64>,
        ) {
            let success_label = if success { "true" } else { "false" };

            self.requests_total
                .with_label_values(&[resource, method, success_label])
                .inc();

            if let Some(lat) = latency_secs {
                self.request_latency_seconds
                    .with_label_values(&[resource, method])
                    .observe(lat);
            }
        }

        fn record_error(&self, resource: &str, kind: &str) {
            self.errors_total.with_label_values(&[resource, kind]).inc();
        }

        fn set_in_flight(&self, count: u64) {
            self.in_flight.set(count as i64);
        }
    }

}

/// Initialise the global telemetry / logging subscriber.
///
/// This sets up a `tracing_subscriber` using `EnvFilter` and a formatted
/// output layer. Call it once at process startup (typically from `main`).
///
/// # Parameters
///
/// - `level`: Optional log level string. If `None`, the function will:
///   - Respect `RUST_LOG` if it is set, or
///   - Default to `"info"` otherwise.
///   If `Some(level)` is provided, it takes precedence over `RUST_LOG`.
///
/// # Examples
///
/// ```ignore
/// airsdk_telemetry::init(Some("info,airsdk_endpoints=debug"))?;
/// ```
pub fn init(level: Option<&str>) -> Result<()> {
    let filter = if let Some(level_str) = level {
        parse_level_filter(level_str)?
    } else if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("info")
    };

    let timestamp_format = format_description::parse(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]",
    )
    .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_timer(OffsetTime::new(
            // Falls back to UTC when the local offset cannot be determined.
            UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            timestamp_format,
        ));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    Ok(())
}

/// Parse a simple level string into an `EnvFilter`.
///
/// Supports both plain levels ("info", "debug", etc.) and full `EnvFilter`
/// expressions (like "warn,airsdk_endpoints=debug").
fn parse_level_filter(level_str: &str) -> Result<EnvFilter> {
    if Level::from_str(level_str).is_ok() {
        return Ok(EnvFilter::new(level_str));
    }

    EnvFilter::builder()
        .parse(level_str)
        .map_err(|e| TelemetryError::InvalidLevel(format!("{} ({})", level_str, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_level() {
        assert!(parse_level_filter("debug").is_ok());
    }

    #[test]
    fn parse_full_expression() {
        assert!(parse_level_filter("warn,airsdk_endpoints=debug").is_ok());
    }

    #[test]
    fn parse_rejects_garbage_directive() {
        assert!(parse_level_filter("airsdk_endpoints=loudest").is_err());
    }

    #[test]
    fn noop_metrics_recorder_does_not_panic() {
        let recorder = NoopMetricsRecorder;

        recorder.record_request_start("simulations", "GET");
        recorder.record_request_end("simulations", "GET", true, Some(0.123));
        recorder.record_error("simulations", "timeout");
        recorder.set_in_flight(5);
    }
}
