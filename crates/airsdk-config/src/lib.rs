//! Configuration loading and types for airsdk.
//!
//! This crate is responsible for:
//! - Defining the client configuration consumed by the transport and the
//!   endpoint runtime
//! - Loading configuration from TOML files
//! - Providing a simple default search strategy (`/etc/airsdk/airsdk.toml`, `./airsdk.toml`)
//!
//! Every section is optional; an empty file yields [`ClientConfig::default`],
//! which talks to the public API with the documented timeouts and page size.
//!
//! ```toml
//! [api]
//! url = "https://air.example.com/api/v3"
//! api_key_env = "AIR_API_KEY"
//!
//! [timeouts]
//! connect_secs = 16
//! read_secs = 61
//!
//! [pagination]
//! page_size = 200
//!
//! [sync]
//! default_flush = "explicit"
//!
//! [sync.models]
//! Simulation = "immediate"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use airsdk_core::{AirError, FlushMode, Result};

/// Public API location used when `[api].url` is not set.
pub const DEFAULT_API_URL: &str = "https://air.nvidia.com/api/";

/// API version path used when the configured URL does not name one.
pub const DEFAULT_API_VERSION_PATH: &str = "/api/v3/";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 16;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 61;
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Root configuration struct for airsdk clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// API location and credential.
    #[serde(default)]
    pub api: ApiConfig,

    /// Transport timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// List pagination.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Flush-mode selection per model type.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl ClientConfig {
    /// Perform basic structural validation of the configuration.
    ///
    /// This does not contact the API; it only rejects values that could
    /// never work.
    pub fn validate(&self) -> Result<()> {
        self.validate_api()?;
        self.validate_timeouts()?;
        self.validate_pagination()?;
        self.validate_sync()?;
        Ok(())
    }

    /// API base URL with the version path applied.
    pub fn api_base_url(&self) -> Result<Url> {
        normalize_api_url(&self.api.url)
    }

    fn validate_api(&self) -> Result<()> {
        let url = self.api.url.trim();
        if url.is_empty() {
            return Err(AirError::invalid_config("api.url", "api.url must not be empty"));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AirError::invalid_config(
                "api.url",
                "api.url must start with http:// or https://",
            ));
        }

        normalize_api_url(url)?;

        if let Some(key) = &self.api.api_key {
            if key.trim().is_empty() {
                return Err(AirError::invalid_config(
                    "api.api_key",
                    "api.api_key must not be empty when set",
                ));
            }
        }

        Ok(())
    }

    fn validate_timeouts(&self) -> Result<()> {
        if self.timeouts.connect_secs == 0 {
            return Err(AirError::invalid_config(
                "timeouts.connect_secs",
                "timeouts.connect_secs must be positive",
            ));
        }

        if self.timeouts.read_secs == 0 {
            return Err(AirError::invalid_config(
                "timeouts.read_secs",
                "timeouts.read_secs must be positive",
            ));
        }

        if self.timeouts.request_secs == Some(0) {
            return Err(AirError::invalid_config(
                "timeouts.request_secs",
                "timeouts.request_secs must be positive when set",
            ));
        }

        Ok(())
    }

    fn validate_pagination(&self) -> Result<()> {
        if self.pagination.page_size == 0 {
            return Err(AirError::invalid_config(
                "pagination.page_size",
                "pagination.page_size must be a positive integer",
            ));
        }
        Ok(())
    }

    fn validate_sync(&self) -> Result<()> {
        for name in self.sync.models.keys() {
            if name.trim().is_empty() {
                return Err(AirError::invalid_config(
                    "sync.models",
                    "model names in sync.models must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// API location and credential.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://air.example.com/api/v3`.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Bearer token handed to the transport as-is.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable to read the bearer token from when `api_key`
    /// is not set.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ApiConfig {
    /// Resolve the opaque credential, preferring the inline key.
    pub fn credential(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|value| !value.trim().is_empty())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            api_key: None,
            api_key_env: None,
        }
    }
}

/// Transport timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// TCP/TLS connect timeout. Defaults to 16.
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Whole-response read timeout. Defaults to 61.
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,

    /// Optional per-request deadline applied by the runtime to every call.
    #[serde(default)]
    pub request_secs: Option<u64>,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn request(&self) -> Option<Duration> {
        self.request_secs.map(Duration::from_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            read_secs: default_read_secs(),
            request_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Items requested per page. Defaults to 200.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Flush-mode selection.
///
/// Precedence: `[sync.models]` entry for the model, then
/// `[sync].default_flush`, then the model's own declared default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub default_flush: Option<FlushMode>,

    /// Model name (e.g. `Simulation`) to flush mode.
    #[serde(default)]
    pub models: HashMap<String, FlushMode>,
}

impl SyncConfig {
    pub fn flush_for(&self, model: &str, declared: FlushMode) -> FlushMode {
        self.models
            .get(model)
            .copied()
            .or(self.default_flush)
            .unwrap_or(declared)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or full filter expression (e.g. `info,airsdk_endpoints=debug`).
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Force the URL path onto a versioned API root.
///
/// A path that already starts with `/api/v<digits>` is kept; anything else is
/// replaced by `/api/v3/`. The result always ends with `/` so relative
/// endpoint paths join underneath it.
pub fn normalize_api_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|err| AirError::invalid_config("api.url", format!("invalid URL '{raw}': {err}")))?;

    if !has_version_path(url.path()) {
        url.set_path(DEFAULT_API_VERSION_PATH);
    } else if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn has_version_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix("/api/v") else {
        return false;
    };
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Load configuration from a specific file path.
///
/// This function parses TOML into [`ClientConfig`] and maps errors into
/// [`AirError::Config`] / [`AirError::InvalidConfig`] as appropriate.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref).map_err(|err| {
        AirError::config(format!(
            "failed to read config file '{}': {}",
            path_ref.display(),
            err
        ))
    })?;

    load_from_str(&contents).map_err(|err| match err {
        AirError::Config(message) => {
            AirError::invalid_config(path_ref.display().to_string(), message)
        }
        other => other,
    })
}

/// Parse configuration from a TOML string.
pub fn load_from_str(contents: &str) -> Result<ClientConfig> {
    toml::from_str(contents).map_err(|err| AirError::config(format!("failed to parse config: {err}")))
}

/// Attempt to load configuration using the default search strategy.
///
/// Current strategy (in order):
/// 1. `/etc/airsdk/airsdk.toml`
/// 2. `./airsdk.toml` (in the current working directory)
pub fn load_default() -> Result<ClientConfig> {
    let candidates = [
        PathBuf::from("/etc/airsdk/airsdk.toml"),
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("airsdk.toml"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return load_from_path(candidate);
        }
    }

    Err(AirError::config(
        "no configuration file found; provide a path explicitly or create /etc/airsdk/airsdk.toml or ./airsdk.toml",
    ))
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_connect_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_path_full() {
        let path = std::env::temp_dir().join("airsdk_config_full_test.toml");
        let _ = fs::remove_file(&path);

        {
            let mut file = fs::File::create(&path).expect("create temp config file");
            writeln!(
                file,
                r#"
[api]
url = "https://air.example.com/api/v2"
api_key = "secret"

[timeouts]
connect_secs = 5
read_secs = 30
request_secs = 10

[pagination]
page_size = 50

[sync]
default_flush = "explicit"

[sync.models]
Node = "immediate"

[telemetry]
log_level = "debug"
"#
            )
            .expect("write config");
        }

        let cfg = load_from_path(&path).expect("load config");
        let _ = fs::remove_file(&path);

        assert_eq!(cfg.api.url, "https://air.example.com/api/v2");
        assert_eq!(cfg.api.credential().as_deref(), Some("secret"));
        assert_eq!(cfg.timeouts.connect(), Duration::from_secs(5));
        assert_eq!(cfg.timeouts.read(), Duration::from_secs(30));
        assert_eq!(cfg.timeouts.request(), Some(Duration::from_secs(10)));
        assert_eq!(cfg.pagination.page_size, 50);
        assert_eq!(cfg.sync.models.get("Node"), Some(&FlushMode::Immediate));
        assert_eq!(
            cfg.telemetry.and_then(|t| t.log_level).as_deref(),
            Some("debug")
        );
    }

    #[test]
    fn test_empty_config_uses_documented_defaults() {
        let cfg = load_from_str("").expect("parse empty config");
        cfg.validate().expect("defaults are valid");

        assert_eq!(cfg.api.url, DEFAULT_API_URL);
        assert_eq!(cfg.timeouts.connect_secs, 16);
        assert_eq!(cfg.timeouts.read_secs, 61);
        assert_eq!(cfg.timeouts.request(), None);
        assert_eq!(cfg.pagination.page_size, 200);
        assert!(cfg.api.credential().is_none());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_from_path("/definitely/not/here/airsdk.toml").unwrap_err();
        assert!(matches!(err, AirError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_is_invalid_config() {
        let path = std::env::temp_dir().join("airsdk_config_bad_test.toml");
        fs::write(&path, "[pagination\npage_size = ").expect("write config");
        let err = load_from_path(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(matches!(err, AirError::InvalidConfig { .. }));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let cfg = load_from_str("[pagination]\npage_size = 0\n").expect("parse");
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration for 'pagination.page_size': pagination.page_size must be a positive integer"
        );
    }

    #[test]
    fn test_non_http_url_rejected() {
        let cfg = load_from_str("[api]\nurl = \"ftp://air.example.com\"\n").expect("parse");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_flush_mode_fails_to_parse() {
        assert!(load_from_str("[sync]\ndefault_flush = \"eager\"\n").is_err());
    }

    #[test]
    fn test_flush_precedence() {
        let cfg = load_from_str(
            "[sync]\ndefault_flush = \"immediate\"\n[sync.models]\nImage = \"explicit\"\n",
        )
        .expect("parse");

        assert_eq!(
            cfg.sync.flush_for("Image", FlushMode::Immediate),
            FlushMode::Explicit
        );
        assert_eq!(
            cfg.sync.flush_for("Node", FlushMode::Explicit),
            FlushMode::Immediate
        );
        assert_eq!(
            SyncConfig::default().flush_for("Node", FlushMode::Immediate),
            FlushMode::Immediate
        );
    }

    #[test]
    fn test_normalize_api_url() {
        assert_eq!(
            normalize_api_url("https://air.example.com").unwrap().as_str(),
            "https://air.example.com/api/v3/"
        );
        assert_eq!(
            normalize_api_url("https://air.example.com/api/").unwrap().as_str(),
            "https://air.example.com/api/v3/"
        );
        assert_eq!(
            normalize_api_url("https://air.example.com/api/v2").unwrap().as_str(),
            "https://air.example.com/api/v2/"
        );
        assert_eq!(
            normalize_api_url("http://localhost:8000/api/v1/").unwrap().as_str(),
            "http://localhost:8000/api/v1/"
        );
        assert!(normalize_api_url("not a url").is_err());
    }

    #[test]
    fn test_credential_from_env() {
        let var = "AIRSDK_CONFIG_TEST_TOKEN";
        std::env::set_var(var, "from-env");
        let cfg = load_from_str(&format!("[api]\napi_key_env = \"{var}\"\n")).expect("parse");
        assert_eq!(cfg.api.credential().as_deref(), Some("from-env"));
        std::env::remove_var(var);
    }
}
