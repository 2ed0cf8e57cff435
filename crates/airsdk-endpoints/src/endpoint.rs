//! CRUD surface for one resource type.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Map, Value};

use airsdk_core::{
    AirError, FieldDescriptor, FieldKind, FlushMode, ModelSchema, Operation, Payload, Result,
    WritePolicy,
};
use airsdk_transport::ApiRequest;

use crate::api::ApiContext;
use crate::compat::LegacyEndpoint;
use crate::identity::Record;
use crate::model::Model;
use crate::pagination::{Cursor, Page};
use crate::reference::{id_from_value, Reference};
use crate::response::{check_status, object_body};

/// Query parameters owned by the cursor.
const CURSOR_PARAMS: &[&str] = &["limit", "offset"];

/// Typed CRUD client for one [`ModelSchema`].
///
/// Cheap to clone; every clone shares the session's transport and identity
/// cache. A *scoped* client (see [`EndpointClient::scoped`]) adds default
/// filters to `list` and default fields to `create`.
#[derive(Clone)]
pub struct EndpointClient {
    ctx: Arc<ApiContext>,
    schema: &'static ModelSchema,
    scope: Vec<(String, String)>,
}

impl EndpointClient {
    pub(crate) fn new(ctx: Arc<ApiContext>, schema: &'static ModelSchema) -> Self {
        Self {
            ctx,
            schema,
            scope: Vec::new(),
        }
    }

    pub(crate) fn ctx(&self) -> &Arc<ApiContext> {
        &self.ctx
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    /// Effective flush mode for instances of this endpoint.
    pub fn flush_mode(&self) -> FlushMode {
        self.ctx.options.flush_mode(self.schema)
    }

    pub fn scope(&self) -> &[(String, String)] {
        &self.scope
    }

    /// Client restricted to resources whose `filter` equals `target`.
    ///
    /// ```ignore
    /// let nodes = api.nodes().scoped("simulation", &sim)?;
    /// let all_nodes_of_sim = nodes.iter()?.collect().await?;
    /// ```
    pub fn scoped<R: Into<Reference>>(&self, filter: &str, target: R) -> Result<Self> {
        if !self.schema.accepts_filter(filter) {
            return Err(AirError::unknown_filter(self.schema.name, filter));
        }
        let key = target.into().key()?;
        if let Some((_, existing)) = self.scope.iter().find(|(name, _)| name == filter) {
            if *existing != key {
                return Err(AirError::invalid_argument(format!(
                    "{} is already scoped to {filter}={existing}",
                    self.schema.name
                )));
            }
            return Ok(self.clone());
        }
        let mut scoped = self.clone();
        scoped.scope.push((filter.to_string(), key));
        Ok(scoped)
    }

    /// Endpoint of another model type in the same session.
    pub(crate) fn sibling(&self, model: &str) -> Result<EndpointClient> {
        Ok(EndpointClient::new(self.ctx.clone(), self.ctx.schema(model)?))
    }

    /// Lazy cursor over every resource matching `filters`.
    ///
    /// Filters are validated up front; no request is made until the cursor
    /// is advanced.
    pub fn list<I, K, V>(&self, filters: I) -> Result<Cursor>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.schema.ensure(Operation::List)?;
        let filters = self.list_filters(filters)?;
        Ok(Cursor::new(self.clone(), filters, self.ctx.options.page_size))
    }

    /// Unfiltered cursor (scope filters still apply).
    pub fn iter(&self) -> Result<Cursor> {
        self.list(std::iter::empty::<(String, String)>())
    }

    /// Fetch every page, keeping at most `workers` page requests in flight.
    ///
    /// The first page is fetched on its own to learn the total and the page
    /// length the server actually grants; results come back in server
    /// order. If the prefetched pages do not line up with the reported
    /// total, the rest is walked sequentially instead.
    pub async fn list_all<I, K, V>(&self, filters: I, workers: usize) -> Result<Vec<Model>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.schema.ensure(Operation::List)?;
        if workers == 0 {
            return Err(AirError::invalid_argument("workers must be at least 1"));
        }
        let filters = self.list_filters(filters)?;
        let page_size = self.ctx.options.page_size;

        let first = self.fetch_page(&filters, page_size, 0).await?;
        let fetched = first.results.len();
        let more = first.next.is_some() && fetched > 0;
        let total = first.count;
        let mut models = self.materialize_all(first.results)?;
        if !more {
            return Ok(models);
        }

        let Some(total) = total.map(|count| count as usize) else {
            return self.list_rest(models, filters, page_size, fetched).await;
        };

        // The server may cap `limit`; stride by what it returned.
        let offsets: Vec<usize> = (fetched..total).step_by(fetched).collect();
        tracing::debug!(
            model = self.schema.name,
            pages = offsets.len() + 1,
            stride = fetched,
            workers,
            "prefetching pages"
        );
        let pages: Vec<Page> = stream::iter(offsets)
            .map(|offset| self.fetch_page(&filters, fetched, offset))
            .buffered(workers)
            .try_collect()
            .await?;

        if !pages_line_up(&pages, fetched, total) {
            tracing::debug!(
                model = self.schema.name,
                total,
                "prefetched pages do not cover the listing; walking it sequentially"
            );
            return self.list_rest(models, filters, page_size, fetched).await;
        }

        for page in pages {
            models.extend(self.materialize_all(page.results)?);
        }
        Ok(models)
    }

    async fn list_rest(
        &self,
        mut models: Vec<Model>,
        filters: Vec<(String, String)>,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Model>> {
        let rest = Cursor::starting_at(self.clone(), filters, page_size, offset)
            .collect()
            .await?;
        models.extend(rest);
        Ok(models)
    }

    /// Fetch one resource by primary key.
    pub async fn get<R: Into<Reference>>(&self, target: R) -> Result<Model> {
        self.schema.ensure(Operation::Get)?;
        let key = target.into().key()?;
        let record = self.fetch_record(&key).await?;
        Ok(Model::from_record(self.clone(), record))
    }

    /// Create a resource and return it as the server stored it.
    pub async fn create<P: Into<Payload>>(&self, payload: P) -> Result<Model> {
        self.schema.ensure(Operation::Create)?;
        let body = self.prepare_create(payload.into())?;
        let record = self.create_record(body).await?;
        Ok(Model::from_record(self.clone(), record))
    }

    /// Unsaved instance; [`Model::save`] creates it.
    pub fn draft<P: Into<Payload>>(&self, payload: P) -> Result<Model> {
        self.schema.ensure(Operation::Create)?;
        let body = self.prepare_create(payload.into())?;
        Ok(Model::draft(self.clone(), body))
    }

    /// Apply `payload` to `target` and return the refreshed instance.
    ///
    /// Server-assigned fields equal to the value already known for
    /// `target` are dropped; any other value for them is an error. An
    /// update that ends up empty sends nothing for a live instance and
    /// degenerates to a `get` for a bare id.
    pub async fn update<R, P>(&self, target: R, payload: P) -> Result<Model>
    where
        R: Into<Reference>,
        P: Into<Payload>,
    {
        self.schema.ensure(Operation::Patch)?;
        let target = target.into();
        let key = target.key()?;
        let known = match target.instance() {
            Some(model) => Some(model.record().clone()),
            None => self.ctx.identity.lookup(self.schema.name, &key),
        };

        let body = self.prepare_update(payload.into(), known.as_deref())?;
        if body.is_empty() {
            return match target {
                Reference::Instance(model) => Ok(model),
                Reference::Id(_) => self.get(key).await,
            };
        }

        let record = self.patch_record(&key, body).await?;
        Ok(Model::from_record(self.clone(), record))
    }

    /// Alias of [`EndpointClient::update`] keyed by primary key.
    pub async fn patch<P: Into<Payload>>(&self, key: &str, payload: P) -> Result<Model> {
        self.update(key, payload).await
    }

    /// Delete `target`. Every live handle of it becomes stale.
    pub async fn delete<R: Into<Reference>>(&self, target: R) -> Result<()> {
        self.schema.ensure(Operation::Delete)?;
        let target = target.into();
        let key = target.key()?;
        self.delete_key(&key).await?;
        if let Some(model) = target.instance() {
            self.ctx.identity.mark_record_deleted(model.record());
        }
        Ok(())
    }

    /// Dispatch a schema-declared business verb.
    ///
    /// Instance verbs need `key`; collection verbs ignore it. The response
    /// body is returned as-is.
    pub async fn invoke(
        &self,
        key: Option<&str>,
        verb: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        let descriptor = self
            .schema
            .verb(verb)
            .ok_or_else(|| AirError::unsupported_operation(self.schema.name, verb))?;
        let path = self.schema.verb_path(descriptor, key)?;

        let mut request = ApiRequest::new(descriptor.method, path);
        let sent = body_fields(body.as_ref());
        if let Some(body) = body {
            request = request.with_body(body);
        } else if descriptor.method.has_body() {
            request = request.with_body(json!({}));
        }

        tracing::debug!(model = self.schema.name, verb, key, "invoking verb");
        let response = self.ctx.send(request).await?;
        check_status(&response, self.schema.name, key, &sent)?;
        Ok(response.body)
    }

    /// Compatibility facade over this endpoint.
    pub fn legacy(&self) -> LegacyEndpoint {
        LegacyEndpoint::new(self.clone())
    }

    /// Turn a JSON object from the server into a live instance.
    pub fn materialize(&self, value: Value) -> Result<Model> {
        match value {
            Value::Object(map) => {
                let record = self.record_from_object(map)?;
                Ok(Model::from_record(self.clone(), record))
            }
            other => Err(AirError::unexpected(
                None,
                format!("expected a {} object, got {other}", self.schema.name),
            )),
        }
    }

    fn materialize_all(&self, values: Vec<Value>) -> Result<Vec<Model>> {
        values.into_iter().map(|v| self.materialize(v)).collect()
    }

    fn list_filters<I, K, V>(&self, filters: I) -> Result<Vec<(String, String)>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.scope.clone();
        for (name, value) in filters {
            let name = name.into();
            let value = value.into();
            if CURSOR_PARAMS.contains(&name.as_str()) || !self.schema.accepts_filter(&name) {
                return Err(AirError::unknown_filter(self.schema.name, name));
            }
            match self.scope.iter().find(|(scoped, _)| *scoped == name) {
                Some((_, scoped)) if *scoped == value => {}
                Some((_, scoped)) => {
                    return Err(AirError::invalid_argument(format!(
                        "filter {name}={value} conflicts with scope {name}={scoped}"
                    )))
                }
                None => merged.push((name, value)),
            }
        }
        Ok(merged)
    }

    fn prepare_create(&self, payload: Payload) -> Result<Map<String, Value>> {
        let mut body = Map::new();
        let mut rejected = Vec::new();

        for (name, value) in payload {
            let field = self.schema.require_field(&name)?;
            match field.policy {
                WritePolicy::ServerAssigned => {
                    rejected.push(name);
                    continue;
                }
                WritePolicy::ClientHint => {
                    tracing::debug!(model = self.schema.name, field = %name, "stripping client hint");
                    continue;
                }
                WritePolicy::ReadWrite => {}
            }
            if value.is_null() && !field.nullable {
                tracing::debug!(model = self.schema.name, field = %name, "dropping null for non-nullable field");
                continue;
            }
            body.insert(name, normalize_reference(field, value, self.schema.primary_key)?);
        }

        if !rejected.is_empty() {
            return Err(AirError::validation(
                self.schema.name,
                rejected,
                Value::String("server-assigned fields cannot be provided on create".to_string()),
            ));
        }

        for (name, value) in &self.scope {
            if self.schema.field(name).is_some() && !body.contains_key(name) {
                body.insert(name.clone(), Value::String(value.clone()));
            }
        }
        Ok(body)
    }

    pub(crate) fn prepare_update(
        &self,
        payload: Payload,
        known: Option<&Record>,
    ) -> Result<Map<String, Value>> {
        let mut body = Map::new();
        for (name, value) in payload {
            let field = self.schema.require_field(&name)?;
            let value = normalize_reference(field, value, self.schema.primary_key)?;
            match field.policy {
                WritePolicy::ServerAssigned => {
                    let current = known.and_then(|record| record.get(&name));
                    if current.as_ref().map(|v| same_value(field, v, &value, self.schema.primary_key)) == Some(true) {
                        tracing::debug!(model = self.schema.name, field = %name, "dropping unchanged server-assigned field");
                        continue;
                    }
                    return Err(AirError::read_only(self.schema.name, name));
                }
                WritePolicy::ClientHint => {
                    tracing::debug!(model = self.schema.name, field = %name, "stripping client hint");
                    continue;
                }
                WritePolicy::ReadWrite => {}
            }
            if value.is_null() && !field.nullable {
                return Err(AirError::invalid_argument(format!(
                    "{}.{name} cannot be null",
                    self.schema.name
                )));
            }
            body.insert(name, value);
        }
        Ok(body)
    }

    pub(crate) async fn fetch_page(
        &self,
        filters: &[(String, String)],
        limit: usize,
        offset: usize,
    ) -> Result<Page> {
        let request = ApiRequest::get(self.schema.collection_path())
            .with_queries(filters.iter().cloned())
            .with_query("limit", limit.to_string())
            .with_query("offset", offset.to_string());

        let response = self.ctx.send(request).await?;
        check_status(&response, self.schema.name, None, &[])?;
        Page::from_response(response)
    }

    pub(crate) async fn fetch_record(&self, key: &str) -> Result<Arc<Record>> {
        let response = self
            .ctx
            .send(ApiRequest::get(self.schema.item_path(key)))
            .await?;
        check_status(&response, self.schema.name, Some(key), &[])?;
        self.record_from_object(object_body(response)?)
    }

    pub(crate) async fn create_record(&self, body: Map<String, Value>) -> Result<Arc<Record>> {
        let sent: Vec<String> = body.keys().cloned().collect();
        tracing::debug!(model = self.schema.name, fields = ?sent, "creating resource");
        let response = self
            .ctx
            .send(ApiRequest::post(self.schema.collection_path(), Value::Object(body)))
            .await?;
        check_status(&response, self.schema.name, None, &sent)?;
        self.record_from_object(object_body(response)?)
    }

    /// PATCH `body` onto `key`. Falls back to a GET when the response is
    /// not a complete representation.
    pub(crate) async fn patch_record(
        &self,
        key: &str,
        body: Map<String, Value>,
    ) -> Result<Arc<Record>> {
        let sent: Vec<String> = body.keys().cloned().collect();
        tracing::debug!(model = self.schema.name, key, fields = ?sent, "patching resource");
        let response = self
            .ctx
            .send(ApiRequest::patch(self.schema.item_path(key), Value::Object(body)))
            .await?;
        check_status(&response, self.schema.name, Some(key), &sent)?;

        match response.body {
            Some(Value::Object(map)) if map.contains_key(self.schema.primary_key) => {
                self.record_from_object(map)
            }
            _ => self.fetch_record(key).await,
        }
    }

    pub(crate) async fn delete_key(&self, key: &str) -> Result<()> {
        tracing::debug!(model = self.schema.name, key, "deleting resource");
        let response = self
            .ctx
            .send(ApiRequest::delete(self.schema.item_path(key)))
            .await?;
        check_status(&response, self.schema.name, Some(key), &[])?;
        self.ctx.identity.mark_deleted(self.schema.name, key);
        Ok(())
    }

    pub(crate) fn record_from_object(&self, map: Map<String, Value>) -> Result<Arc<Record>> {
        let key = map
            .get(self.schema.primary_key)
            .and_then(|v| id_from_value(v, self.schema.primary_key))
            .ok_or_else(|| {
                AirError::unexpected(
                    None,
                    format!(
                        "{} representation has no '{}'",
                        self.schema.name, self.schema.primary_key
                    ),
                )
            })?;
        Ok(self.ctx.identity.upsert(self.schema.name, &key, map))
    }
}

impl std::fmt::Debug for EndpointClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointClient")
            .field("model", &self.schema.name)
            .field("path", &self.schema.path)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Reduce reference-shaped values (embedded objects) to their identifiers.
pub(crate) fn normalize_reference(
    field: &FieldDescriptor,
    value: Value,
    primary_key: &str,
) -> Result<Value> {
    match (field.kind, value) {
        (FieldKind::Scalar, value) => Ok(value),
        (_, Value::Null) => Ok(Value::Null),
        (FieldKind::Reference { .. }, value) => id_from_value(&value, primary_key)
            .map(Value::String)
            .ok_or_else(|| {
                AirError::invalid_argument(format!("'{}' expects an id, got {value}", field.name))
            }),
        (FieldKind::ReferenceList { .. }, Value::Array(items)) => items
            .iter()
            .map(|item| {
                id_from_value(item, primary_key).map(Value::String).ok_or_else(|| {
                    AirError::invalid_argument(format!(
                        "'{}' expects a list of ids, got {item}",
                        field.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (FieldKind::ReferenceList { .. }, other) => Err(AirError::invalid_argument(format!(
            "'{}' expects a list of ids, got {other}",
            field.name
        ))),
    }
}

fn same_value(field: &FieldDescriptor, current: &Value, proposed: &Value, primary_key: &str) -> bool {
    match normalize_reference(field, current.clone(), primary_key) {
        Ok(current) => current == *proposed,
        Err(_) => current == proposed,
    }
}

fn body_fields(body: Option<&Value>) -> Vec<String> {
    body.and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Every prefetched page but the last is full and together with the first
/// page of `stride` items they account for exactly `total`.
fn pages_line_up(pages: &[Page], stride: usize, total: usize) -> bool {
    let Some((last, full)) = pages.split_last() else {
        return stride == total;
    };
    let covered = stride + full.len() * stride + last.results.len();
    full.iter().all(|page| page.results.len() == stride) && covered == total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AirApi, ClientOptions};
    use airsdk_core::Method;
    use airsdk_transport::{ApiResponse, CollectionRules, Injection, MemoryTransport, Transport};

    fn setup(page_size: usize) -> (Arc<MemoryTransport>, AirApi) {
        let server = Arc::new(
            MemoryTransport::new()
                .with_collection("simulations", CollectionRules::new().require("name"))
                .with_collection(
                    "simulations/nodes",
                    CollectionRules::new().read_only("state").default_value("state", json!("NEW")),
                )
                .with_collection("images", CollectionRules::new())
                .with_collection("simulations/nodes/interfaces/services", CollectionRules::new()),
        );
        let api = AirApi::with_transport(
            server.clone(),
            ClientOptions::default().with_page_size(page_size),
        )
        .unwrap();
        (server, api)
    }

    #[tokio::test]
    async fn create_returns_server_representation() {
        let (server, api) = setup(10);
        let sim = api
            .simulations()
            .create(Payload::new().with("name", "lab"))
            .await
            .unwrap();
        assert_eq!(sim.get_str("name").unwrap(), "lab");
        assert!(sim.key().is_some());
        assert_eq!(server.count(Method::Post, "simulations/"), 1);
    }

    #[tokio::test]
    async fn create_rejects_server_assigned_fields_before_sending() {
        let (server, api) = setup(10);
        let err = api
            .simulations()
            .create(Payload::new().with("name", "lab").with("state", "LOADED"))
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::ValidationRejected { ref fields, .. } if fields == &["state".to_string()]));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn create_strips_client_hints() {
        let (server, api) = setup(10);
        api.images()
            .create(Payload::new().with("name", "cumulus").with("size", 10))
            .await
            .unwrap();
        let body = server.requests()[0].body.clone().unwrap();
        assert!(body.get("size").is_none());
        assert_eq!(body["name"], json!("cumulus"));
    }

    #[tokio::test]
    async fn unknown_fields_and_filters_fail_locally() {
        let (server, api) = setup(10);
        let err = api
            .simulations()
            .create(Payload::new().with("colour", "red"))
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::UnknownField { .. }));

        let err = api.simulations().list([("colour", "red")]).unwrap_err();
        assert!(matches!(err, AirError::UnknownFilter { .. }));
        let err = api.simulations().list([("limit", "5")]).unwrap_err();
        assert!(matches!(err, AirError::UnknownFilter { .. }));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn validation_errors_fall_back_to_sent_fields() {
        let (_server, api) = setup(10);
        let err = api
            .simulations()
            .create(Payload::new().with("documentation", "x"))
            .await
            .unwrap_err();
        match err {
            AirError::ValidationRejected { fields, .. } => assert_eq!(fields, vec!["documentation"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_operations_send_nothing() {
        let (server, api) = setup(10);
        let err = api
            .services()
            .update("svc-1", Payload::new().with("name", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::UnsupportedOperation { .. }));
        let err = api.systems().create(Payload::new()).await.unwrap_err();
        assert!(matches!(err, AirError::UnsupportedOperation { .. }));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn update_then_get_observes_change() {
        let (_server, api) = setup(10);
        let sim = api
            .simulations()
            .create(Payload::new().with("name", "old"))
            .await
            .unwrap();
        let key = sim.key().unwrap();

        api.simulations()
            .update(key.as_str(), Payload::new().with("name", "new"))
            .await
            .unwrap();
        let fetched = api.simulations().get(key.as_str()).await.unwrap();
        assert_eq!(fetched.get_str("name").unwrap(), "new");
        assert_eq!(sim.get_str("name").unwrap(), "new");
    }

    #[tokio::test]
    async fn update_with_unchanged_server_assigned_field_is_a_no_op() {
        let (server, api) = setup(10);
        let id = server.seed("simulations/nodes", json!({"name": "leaf", "state": "NEW"}));
        let node = api.nodes().get(id.as_str()).await.unwrap();
        server.clear_log();

        let same = api
            .nodes()
            .update(&node, Payload::new().with("state", "NEW"))
            .await
            .unwrap();
        assert_eq!(same.key(), node.key());
        assert!(server.requests().is_empty());

        let err = api
            .nodes()
            .update(&node, Payload::new().with("state", "BOOTING"))
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::ReadOnlyField { .. }));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let (_server, api) = setup(10);
        let sim = api
            .simulations()
            .create(Payload::new().with("name", "doomed"))
            .await
            .unwrap();
        let key = sim.key().unwrap();

        api.simulations().delete(key.as_str()).await.unwrap();
        assert!(sim.ensure_live().is_err());

        let err = api.simulations().delete(key.as_str()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn scoped_endpoint_filters_and_fills_in_scope() {
        let (server, api) = setup(10);
        let a = server.seed("simulations", json!({"name": "a"}));
        let b = server.seed("simulations", json!({"name": "b"}));
        server.seed("simulations/nodes", json!({"name": "n1", "simulation": a}));
        server.seed("simulations/nodes", json!({"name": "n2", "simulation": b}));

        let nodes = api.nodes().scoped("simulation", a.as_str()).unwrap();
        let listed = nodes.iter().unwrap().collect().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].get_str("name").unwrap(), "n1");

        let created = nodes.create(Payload::new().with("name", "n3")).await.unwrap();
        assert_eq!(created.get("simulation").unwrap(), json!(a));

        let err = nodes.list([("simulation", b.as_str())]).unwrap_err();
        assert!(matches!(err, AirError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn list_all_preserves_order_across_workers() {
        let (server, api) = setup(3);
        for i in 0..10 {
            server.seed("images", json!({"name": format!("img-{i:02}")}));
        }
        let images = api.images().list_all([("ordering", "name")], 4).await.unwrap();
        let names: Vec<String> = images.iter().map(|m| m.get_str("name").unwrap()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("img-{i:02}")).collect();
        assert_eq!(names, expected);
        assert_eq!(server.count(Method::Get, "images/"), 4);

        assert!(api.images().list_all([("ordering", "name")], 0).await.is_err());
    }

    /// Serves at most `cap` items per page whatever `limit` asks for.
    struct CappedLimit {
        inner: Arc<MemoryTransport>,
        cap: usize,
    }

    #[async_trait::async_trait]
    impl Transport for CappedLimit {
        async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
            for (name, value) in request.query.iter_mut() {
                if name.as_str() == "limit" && value.parse::<usize>().map_or(false, |n| n > self.cap) {
                    *value = self.cap.to_string();
                }
            }
            self.inner.send(request).await
        }
    }

    #[tokio::test]
    async fn list_all_follows_server_capped_page_length() {
        let server = Arc::new(MemoryTransport::new().with_collection("images", CollectionRules::new()));
        for i in 0..10 {
            server.seed("images", json!({"name": format!("img-{i:02}")}));
        }
        let capped = Arc::new(CappedLimit {
            inner: server.clone(),
            cap: 2,
        });
        let api = AirApi::with_transport(capped, ClientOptions::default().with_page_size(3)).unwrap();

        let images = api.images().list_all([("ordering", "name")], 4).await.unwrap();
        let names: Vec<String> = images.iter().map(|m| m.get_str("name").unwrap()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("img-{i:02}")).collect();
        assert_eq!(names, expected);
        assert_eq!(server.count(Method::Get, "images/"), 5);
    }

    #[test]
    fn short_prefetched_pages_do_not_line_up() {
        let page = |n: usize| Page {
            count: Some(10),
            next: None,
            results: vec![Value::Null; n],
        };
        assert!(pages_line_up(&[page(3), page(3), page(1)], 3, 10));
        assert!(!pages_line_up(&[page(2), page(2), page(2)], 3, 10));
        assert!(!pages_line_up(&[], 3, 10));
        assert!(pages_line_up(&[], 4, 4));
    }

    #[tokio::test]
    async fn verbs_hit_their_paths() {
        let (server, api) = setup(10);
        let id = server.seed("simulations", json!({"name": "lab", "state": "STORED"}));
        server.on_item_action("simulations", "start", |record, _| {
            record.insert("state".into(), json!("LOADING"));
            (200, Value::Object(record.clone()))
        });

        let body = api.simulations().invoke(Some(&id), "start", None).await.unwrap();
        assert_eq!(body.unwrap()["state"], json!("LOADING"));
        let request = server.requests().pop().unwrap();
        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.path, format!("simulations/{id}/start/"));

        let err = api.simulations().invoke(Some(&id), "teleport", None).await.unwrap_err();
        assert!(matches!(err, AirError::UnsupportedOperation { .. }));
        let err = api.simulations().invoke(None, "start", None).await.unwrap_err();
        assert!(matches!(err, AirError::Unsaved { .. }));
    }

    #[tokio::test]
    async fn patch_without_representation_falls_back_to_get() {
        let (server, api) = setup(10);
        let id = server.seed("images", json!({"name": "old"}));
        server.inject(Injection::Status(200, json!({"status": "ok"})));

        let image = api
            .images()
            .patch(&id, Payload::new().with("name", "new"))
            .await
            .unwrap();
        // The injected reply swallowed the PATCH; the follow-up GET sees the stored value.
        assert_eq!(image.get_str("name").unwrap(), "old");
        assert_eq!(server.count(Method::Get, &format!("images/{id}/")), 1);
    }

    #[tokio::test]
    async fn timeouts_surface_as_errors() {
        let (server, api) = setup(10);
        server.inject(Injection::Timeout);
        let err = api.images().get("img-1").await.unwrap_err();
        assert!(matches!(err, AirError::Timeout(_)));
        assert!(err.is_transient());
    }
}
