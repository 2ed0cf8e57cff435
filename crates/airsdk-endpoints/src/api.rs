//! Session entry point.
//!
//! An [`AirApi`] owns the transport, the client options and the identity
//! cache. Every [`EndpointClient`] and [`Model`](crate::Model) created from it
//! shares that state through one `Arc<ApiContext>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;

use airsdk_config::{ClientConfig, SyncConfig, DEFAULT_PAGE_SIZE};
use airsdk_core::{AirError, FlushMode, ModelSchema, Result};
use airsdk_telemetry::MetricsRecorder;
use airsdk_transport::{ApiRequest, ApiResponse, HttpTransport, HttpTransportBuilder, Transport};

use crate::compat::LegacyApi;
use crate::endpoint::EndpointClient;
use crate::identity::IdentityMap;
use crate::resources;

/// Errors raised while registering model schemas.
#[derive(Debug, Error)]
pub enum SchemaRegistryError {
    #[error("duplicate model name: {0}")]
    DuplicateModel(String),

    #[error("model '{model}' reuses endpoint path '{path}'")]
    DuplicatePath { model: String, path: String },
}

impl From<SchemaRegistryError> for AirError {
    fn from(err: SchemaRegistryError) -> Self {
        AirError::config(err.to_string())
    }
}

/// Runtime knobs shared by every endpoint of a session.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Items requested per list page.
    pub page_size: usize,

    /// Deadline applied to every request; the transport default applies when `None`.
    pub request_timeout: Option<Duration>,

    /// Flush-mode overrides.
    pub sync: SyncConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: None,
            sync: SyncConfig::default(),
        }
    }
}

impl ClientOptions {
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self {
            page_size: cfg.pagination.page_size,
            request_timeout: cfg.timeouts.request(),
            sync: cfg.sync.clone(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Override the flush mode of a single model type.
    pub fn with_flush<S: Into<String>>(mut self, model: S, mode: FlushMode) -> Self {
        self.sync.models.insert(model.into(), mode);
        self
    }

    /// Effective flush mode for `schema`.
    pub fn flush_mode(&self, schema: &ModelSchema) -> FlushMode {
        self.sync.flush_for(schema.name, schema.flush)
    }
}

/// State shared by every handle of one session.
pub(crate) struct ApiContext {
    transport: Arc<dyn Transport>,
    pub(crate) options: ClientOptions,
    pub(crate) identity: IdentityMap,
    schemas: RwLock<HashMap<&'static str, &'static ModelSchema>>,
}

impl ApiContext {
    pub(crate) fn schema(&self, name: &str) -> Result<&'static ModelSchema> {
        self.schemas
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| AirError::config(format!("no schema registered for model '{name}'")))
    }

    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request = match request.timeout {
            Some(_) => request,
            None => request.with_timeout(self.options.request_timeout),
        };
        tracing::trace!(
            method = %request.method,
            path = %request.path,
            "sending API request"
        );
        self.transport.send(request).await
    }
}

/// Builder for [`AirApi`].
pub struct AirApiBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: Option<ClientConfig>,
    options: Option<ClientOptions>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    schemas: Vec<&'static ModelSchema>,
}

impl AirApiBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: None,
            options: None,
            metrics: None,
            schemas: Vec::new(),
        }
    }

    /// Use an already-built transport instead of one derived from config.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_config(mut self, cfg: ClientConfig) -> Self {
        self.config = Some(cfg);
        self
    }

    /// Options take precedence over the ones derived from config.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Metrics recorder handed to the HTTP transport built from config.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register an additional model type.
    pub fn with_schema(mut self, schema: &'static ModelSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn build(self) -> Result<AirApi> {
        let cfg = match self.config {
            Some(cfg) => {
                cfg.validate()?;
                Some(cfg)
            }
            None => None,
        };

        let options = match (self.options, &cfg) {
            (Some(options), _) => options,
            (None, Some(cfg)) => ClientOptions::from_config(cfg),
            (None, None) => ClientOptions::default(),
        };
        if options.page_size == 0 {
            return Err(AirError::invalid_config(
                "pagination.page_size",
                "page size must be a positive integer",
            ));
        }

        let transport: Arc<dyn Transport> = match (self.transport, &cfg) {
            (Some(transport), _) => transport,
            (None, Some(cfg)) => {
                let mut builder = HttpTransportBuilder::from_config(cfg);
                if let Some(metrics) = self.metrics {
                    builder = builder.with_metrics(metrics);
                }
                Arc::new(builder.build()?)
            }
            (None, None) => {
                return Err(AirError::config(
                    "either a transport or a client configuration is required",
                ))
            }
        };

        let mut schemas = HashMap::new();
        for schema in resources::all().iter().copied().chain(self.schemas) {
            register(&mut schemas, schema)?;
        }

        for name in options.sync.models.keys() {
            if !schemas.contains_key(name.as_str()) {
                tracing::warn!(model = %name, "flush override names an unknown model; ignoring it");
            }
        }

        Ok(AirApi {
            ctx: Arc::new(ApiContext {
                transport,
                options,
                identity: IdentityMap::default(),
                schemas: RwLock::new(schemas),
            }),
        })
    }
}

impl Default for AirApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn register(
    schemas: &mut HashMap<&'static str, &'static ModelSchema>,
    schema: &'static ModelSchema,
) -> std::result::Result<(), SchemaRegistryError> {
    if schemas.contains_key(schema.name) {
        return Err(SchemaRegistryError::DuplicateModel(schema.name.to_string()));
    }
    if schemas
        .values()
        .any(|existing| existing.path.trim_matches('/') == schema.path.trim_matches('/'))
    {
        return Err(SchemaRegistryError::DuplicatePath {
            model: schema.name.to_string(),
            path: schema.path.to_string(),
        });
    }
    schemas.insert(schema.name, schema);
    Ok(())
}

/// A client session against the resource API.
#[derive(Clone)]
pub struct AirApi {
    ctx: Arc<ApiContext>,
}

impl AirApi {
    pub fn builder() -> AirApiBuilder {
        AirApiBuilder::new()
    }

    /// Validate `cfg` and connect over HTTP.
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        AirApiBuilder::new().with_config(cfg.clone()).build()
    }

    /// Session over an arbitrary transport.
    pub fn with_transport(transport: Arc<dyn Transport>, options: ClientOptions) -> Result<Self> {
        AirApiBuilder::new()
            .with_transport(transport)
            .with_options(options)
            .build()
    }

    /// Convenience for `with_transport` over a concrete HTTP transport.
    pub fn over_http(transport: HttpTransport, options: ClientOptions) -> Result<Self> {
        Self::with_transport(Arc::new(transport), options)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.ctx.options
    }

    /// Register a model type after construction.
    pub fn register(&self, schema: &'static ModelSchema) -> Result<()> {
        let mut schemas = self.ctx.schemas.write();
        register(&mut schemas, schema)?;
        Ok(())
    }

    pub fn endpoint(&self, schema: &'static ModelSchema) -> EndpointClient {
        EndpointClient::new(self.ctx.clone(), schema)
    }

    /// Endpoint for a model name or path, e.g. `"Node"` or `"simulations/nodes"`.
    pub fn endpoint_named(&self, name: &str) -> Result<EndpointClient> {
        let trimmed = name.trim().trim_matches('/');
        let schema = {
            let schemas = self.ctx.schemas.read();
            schemas
                .values()
                .copied()
                .find(|s| s.name.eq_ignore_ascii_case(trimmed) || s.path.trim_matches('/') == trimmed)
        };
        schema
            .map(|schema| self.endpoint(schema))
            .ok_or_else(|| AirError::invalid_argument(format!("unknown model or endpoint '{name}'")))
    }

    /// Compatibility facade for older call sites.
    pub fn legacy(&self) -> LegacyApi {
        LegacyApi::new(self.clone())
    }

    pub fn simulations(&self) -> EndpointClient {
        self.endpoint(&resources::SIMULATION)
    }

    pub fn nodes(&self) -> EndpointClient {
        self.endpoint(&resources::NODE)
    }

    pub fn interfaces(&self) -> EndpointClient {
        self.endpoint(&resources::INTERFACE)
    }

    pub fn images(&self) -> EndpointClient {
        self.endpoint(&resources::IMAGE)
    }

    pub fn services(&self) -> EndpointClient {
        self.endpoint(&resources::SERVICE)
    }

    pub fn systems(&self) -> EndpointClient {
        self.endpoint(&resources::SYSTEM)
    }

    pub fn node_instructions(&self) -> EndpointClient {
        self.endpoint(&resources::NODE_INSTRUCTION)
    }

    pub fn ssh_keys(&self) -> EndpointClient {
        self.endpoint(&resources::SSH_KEY)
    }

    pub fn user_configs(&self) -> EndpointClient {
        self.endpoint(&resources::USER_CONFIG)
    }

    pub fn organizations(&self) -> EndpointClient {
        self.endpoint(&resources::ORGANIZATION)
    }

    pub fn manifests(&self) -> EndpointClient {
        self.endpoint(&resources::MANIFEST)
    }

    pub fn marketplace_demos(&self) -> EndpointClient {
        self.endpoint(&resources::MARKETPLACE_DEMO)
    }

    /// Number of resources with at least one live handle in this session.
    pub fn cached_instances(&self) -> usize {
        self.ctx.identity.live_len()
    }
}

impl std::fmt::Debug for AirApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirApi")
            .field("options", &self.ctx.options)
            .finish_non_exhaustive()
    }
}
