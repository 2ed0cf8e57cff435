//! Legacy naming compatibility.
//!
//! Older call sites address resources through a previous generation of field
//! and verb names. The wrappers in this module translate those names onto the
//! canonical [`Model`], [`EndpointClient`] and [`AirApi`] surface: they hold a
//! canonical handle and forward to it, so canonical state is never stored
//! under a legacy name. Every translated call logs a deprecation warning
//! naming its replacement.
//!
//! ```rust,ignore
//! let mut sim = api.simulations().get("sim-1").await?;
//! let asleep = sim.legacy().get("sleep")?;          // sleep_at != null
//! sim.legacy().call("load", Payload::new()).await?; // invoke("start")
//! ```

mod tables;

use chrono::{DateTime, Duration as ChronoDuration};
use serde_json::{json, Map, Value};

use airsdk_core::{AirError, Maybe, Payload, Result};

use crate::api::AirApi;
use crate::endpoint::EndpointClient;
use crate::model::Model;
use crate::pagination::Cursor;
use crate::reference::{id_from_value, Reference};

/// How a legacy field relates to its canonical counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    /// Same value under a new name.
    Rename,
    /// Read-only boolean: whether the canonical field is non-null.
    PresenceOf,
    /// Readable under the old name; dropped from payloads and filters.
    ReadOnly,
    /// JSON text carrying only `keep` from the canonical object.
    JsonText { keep: &'static [&'static str] },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldAlias {
    pub legacy: &'static str,
    pub canonical: &'static str,
    pub kind: AliasKind,
}

impl FieldAlias {
    pub const fn rename(legacy: &'static str, canonical: &'static str) -> Self {
        Self {
            legacy,
            canonical,
            kind: AliasKind::Rename,
        }
    }

    pub const fn read_only(legacy: &'static str, canonical: &'static str) -> Self {
        Self {
            legacy,
            canonical,
            kind: AliasKind::ReadOnly,
        }
    }

    pub const fn presence(legacy: &'static str, canonical: &'static str) -> Self {
        Self {
            legacy,
            canonical,
            kind: AliasKind::PresenceOf,
        }
    }

    pub const fn json_text(
        legacy: &'static str,
        canonical: &'static str,
        keep: &'static [&'static str],
    ) -> Self {
        Self {
            legacy,
            canonical,
            kind: AliasKind::JsonText { keep },
        }
    }

    /// Legacy view of a canonical value. Pure: equal inputs give equal outputs.
    pub fn read(&self, canonical: Value) -> Value {
        match self.kind {
            AliasKind::Rename | AliasKind::ReadOnly => canonical,
            AliasKind::PresenceOf => Value::Bool(!canonical.is_null()),
            AliasKind::JsonText { keep } => match canonical {
                Value::Object(map) => Value::String(Value::Object(subset(map, keep)).to_string()),
                other => other,
            },
        }
    }

    /// Canonical value for a legacy value found in a payload.
    pub fn write(&self, value: Value) -> Result<Maybe<Value>> {
        match self.kind {
            AliasKind::Rename if value.is_null() => Ok(Maybe::Clear),
            AliasKind::Rename => Ok(Maybe::Set(value)),
            AliasKind::ReadOnly => Ok(Maybe::NotProvided),
            AliasKind::PresenceOf => match value {
                Value::Bool(false) | Value::Null => Ok(Maybe::Clear),
                Value::Bool(true) => Err(AirError::invalid_argument(format!(
                    "'{}: true' has no equivalent; set '{}' to a timestamp instead",
                    self.legacy, self.canonical
                ))),
                other => Err(AirError::invalid_argument(format!(
                    "'{}' expects a boolean, got {other}",
                    self.legacy
                ))),
            },
            AliasKind::JsonText { keep } => {
                let parsed = match value {
                    Value::String(text) => serde_json::from_str(&text).map_err(|e| {
                        AirError::invalid_argument(format!(
                            "'{}' is not valid JSON: {e}",
                            self.legacy
                        ))
                    })?,
                    other => other,
                };
                match parsed {
                    Value::Null => Ok(Maybe::NotProvided),
                    Value::Object(map) => {
                        let kept = subset(map, keep);
                        if kept.is_empty() {
                            Ok(Maybe::NotProvided)
                        } else {
                            Ok(Maybe::Set(Value::Object(kept)))
                        }
                    }
                    other => Err(AirError::invalid_argument(format!(
                        "'{}' expects an object, got {other}",
                        self.legacy
                    ))),
                }
            }
        }
    }
}

fn subset(map: Map<String, Value>, keep: &[&str]) -> Map<String, Value> {
    map.into_iter()
        .filter(|(k, _)| keep.contains(&k.as_str()))
        .collect()
}

/// A legacy reference reached by following canonical references in order.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceChain {
    pub legacy: &'static str,
    pub path: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub enum LegacyDefault {
    Bool(bool),
    Null,
}

impl LegacyDefault {
    fn to_value(self) -> Value {
        match self {
            LegacyDefault::Bool(b) => Value::Bool(b),
            LegacyDefault::Null => Value::Null,
        }
    }
}

/// Canonical verb invocation with renamed and defaulted parameters.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalCall {
    pub verb: &'static str,
    /// Body parameter that carries the calling instance's key.
    pub self_param: Option<&'static str>,
    pub renames: &'static [(&'static str, &'static str)],
    pub defaults: &'static [(&'static str, LegacyDefault)],
}

impl CanonicalCall {
    pub const fn plain(verb: &'static str) -> Self {
        Self {
            verb,
            self_param: None,
            renames: &[],
            defaults: &[],
        }
    }

    /// Request body for `args`. A canonical name given explicitly wins over
    /// its legacy spelling.
    pub fn body(&self, args: Payload, self_key: Option<&str>) -> Option<Value> {
        let mut body = Map::new();
        let mut renamed = Vec::new();
        for (name, value) in args {
            match self.renames.iter().find(|(legacy, _)| *legacy == name) {
                Some((_, canonical)) => renamed.push((*canonical, value)),
                None => {
                    body.insert(name, value);
                }
            }
        }
        for (canonical, value) in renamed {
            body.entry(canonical).or_insert(value);
        }
        for (name, default) in self.defaults {
            body.entry(*name).or_insert_with(|| default.to_value());
        }
        if let (Some(param), Some(key)) = (self.self_param, self_key) {
            body.insert(param.to_string(), Value::String(key.to_string()));
        }
        (!body.is_empty()).then_some(Value::Object(body))
    }
}

/// Where a legacy instance verb goes.
#[derive(Debug, Clone, Copy)]
pub enum VerbRoute {
    Canonical(CanonicalCall),
    /// Collection verb taking `{list_key: [{id}]}` for this one instance.
    Batch {
        verb: &'static str,
        list_key: &'static str,
    },
    /// Advance a timestamp field and save.
    ShiftTimestamp { field: &'static str, hours: i64 },
    Destroy,
    /// Pick another legacy verb of the same table by the value of `param`.
    Dispatch {
        param: &'static str,
        actions: &'static [(&'static str, &'static str)],
        unknown_hint: &'static str,
    },
    Removed { hint: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyVerb {
    pub name: &'static str,
    pub replacement: &'static str,
    pub route: VerbRoute,
}

/// Where a legacy endpoint method goes.
#[derive(Debug, Clone, Copy)]
pub enum EndpointVerb {
    /// `list()`, with legacy argument names renamed to filters.
    List {
        renames: &'static [(&'static str, &'static str)],
    },
    Get { id_arg: &'static str },
    Create,
    Update { id_arg: &'static str },
    Verb(CanonicalCall),
    Removed { hint: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyEndpointVerb {
    pub name: &'static str,
    pub replacement: &'static str,
    pub verb: EndpointVerb,
}

/// Legacy names of one model type.
#[derive(Debug)]
pub struct AliasTable {
    pub model: &'static str,
    pub fields: &'static [FieldAlias],
    pub removed_fields: &'static [&'static str],
    pub chains: &'static [ReferenceChain],
    /// Legacy state name and the canonical states it stands for.
    pub states: &'static [(&'static str, &'static [&'static str])],
    pub verbs: &'static [LegacyVerb],
    pub endpoint_verbs: &'static [LegacyEndpointVerb],
    /// Renames applied only when creating, ahead of `fields`.
    pub create_renames: &'static [(&'static str, &'static str)],
}

impl AliasTable {
    pub fn field(&self, legacy: &str) -> Option<&'static FieldAlias> {
        let fields: &'static [FieldAlias] = self.fields;
        fields.iter().find(|f| f.legacy == legacy)
    }

    pub fn is_removed(&self, name: &str) -> bool {
        self.removed_fields.contains(&name)
    }

    pub fn chain(&self, legacy: &str) -> Option<&'static ReferenceChain> {
        let chains: &'static [ReferenceChain] = self.chains;
        chains.iter().find(|c| c.legacy == legacy)
    }

    pub fn states_for(&self, legacy: &str) -> Option<&'static [&'static str]> {
        self.states
            .iter()
            .find(|(name, _)| *name == legacy)
            .map(|(_, states)| *states)
    }

    pub fn verb(&self, name: &str) -> Option<&'static LegacyVerb> {
        let verbs: &'static [LegacyVerb] = self.verbs;
        verbs.iter().find(|v| v.name == name)
    }

    pub fn endpoint_verb(&self, name: &str) -> Option<&'static LegacyEndpointVerb> {
        let own: &'static [LegacyEndpointVerb] = self.endpoint_verbs;
        tables::COMMON_ENDPOINT_VERBS
            .iter()
            .chain(own.iter())
            .find(|v| v.name == name)
    }
}

/// Table for `model`; models without legacy names get an empty one.
pub fn table_for(model: &str) -> &'static AliasTable {
    tables::ALL
        .iter()
        .copied()
        .find(|t| t.model == model)
        .unwrap_or(&tables::EMPTY)
}

/// Result of a legacy call, shaped like what the old method returned.
#[derive(Debug)]
pub enum LegacyOutcome {
    Model(Model),
    Cursor(Cursor),
    Value(Value),
    Done,
}

impl LegacyOutcome {
    pub fn into_model(self) -> Option<Model> {
        match self {
            LegacyOutcome::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn into_cursor(self) -> Option<Cursor> {
        match self {
            LegacyOutcome::Cursor(cursor) => Some(cursor),
            _ => None,
        }
    }
}

fn deprecated(model: &str, legacy: &str, replacement: &str) {
    tracing::warn!(model, legacy, replacement, "deprecated legacy name");
}

/// Rename legacy keys of a create/update payload and drop removed ones.
fn translate_payload(table: &AliasTable, model: &str, payload: Payload) -> Result<Payload> {
    let mut out = Payload::new();
    let mut aliased = Vec::new();
    for (name, value) in payload {
        if table.is_removed(&name) || table.chain(&name).is_some() {
            tracing::warn!(model, field = %name, "dropping field removed from the API");
            continue;
        }
        match table.field(&name) {
            Some(alias) if table.chain(alias.canonical).is_some() => {
                tracing::warn!(model, field = %name, "dropping derived reference from payload");
            }
            Some(alias) => {
                deprecated(model, alias.legacy, alias.canonical);
                let value = alias.write(value)?;
                if value.is_provided() {
                    aliased.push((alias.canonical, value));
                } else if alias.kind == AliasKind::ReadOnly {
                    tracing::warn!(model, field = %name, "dropping read-only field from payload");
                }
            }
            None => {
                out.insert(name, value);
            }
        }
    }
    for (canonical, value) in aliased {
        if !out.contains(canonical) {
            out = out.with_maybe(canonical, value);
        }
    }
    Ok(out)
}

fn translate_filters(
    table: &AliasTable,
    model: &str,
    filters: Payload,
) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(filters.len());
    for (name, value) in filters {
        if table.is_removed(&name) {
            tracing::warn!(model, filter = %name, "dropping filter removed from the API");
            continue;
        }
        let name = match table.field(&name) {
            Some(alias) if alias.kind == AliasKind::ReadOnly => {
                tracing::warn!(model, filter = %name, "dropping read-only filter");
                continue;
            }
            Some(alias) if alias.kind == AliasKind::Rename => {
                deprecated(model, alias.legacy, alias.canonical);
                alias.canonical.to_string()
            }
            Some(alias) => {
                return Err(AirError::invalid_argument(format!(
                    "legacy field '{}' cannot be used as a filter",
                    alias.legacy
                )))
            }
            None => name,
        };
        out.push((name, filter_value(value)));
    }
    Ok(out)
}

fn filter_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Object(_) => id_from_value(&value, "id").unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Legacy view of one instance. Obtained from [`Model::legacy`].
#[derive(Debug)]
pub struct LegacyModel<'a> {
    model: &'a mut Model,
    table: &'static AliasTable,
}

impl<'a> LegacyModel<'a> {
    pub(crate) fn new(model: &'a mut Model) -> Self {
        let table = table_for(model.schema().name);
        Self { model, table }
    }

    pub fn table(&self) -> &'static AliasTable {
        self.table
    }

    /// Read a field by its legacy (or canonical) name.
    pub fn get(&self, name: &str) -> Result<Value> {
        let model = self.model.schema().name;
        if self.table.is_removed(name) {
            return Err(AirError::unsupported_legacy(
                format!("{model}.{name}"),
                "field was removed from the API",
            ));
        }
        if let Some(alias) = self.table.field(name) {
            deprecated(model, alias.legacy, alias.canonical);
            return Ok(alias.read(self.model.get(alias.canonical)?));
        }
        if let Some(chain) = self.table.chain(name) {
            return Err(AirError::invalid_argument(format!(
                "'{name}' is derived from {}; use resolve()",
                chain.path.join(".")
            )));
        }
        self.model.get(name)
    }

    /// Stage a write under a legacy name. Computed fields are read-only.
    pub async fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<()> {
        let model = self.model.schema().name;
        if self.table.is_removed(name) {
            return Err(AirError::unsupported_legacy(
                format!("{model}.{name}"),
                "field was removed from the API",
            ));
        }
        if self.table.chain(name).is_some() {
            return Err(AirError::read_only(model, name));
        }
        let Some(alias) = self.table.field(name) else {
            return self.model.set(name, value).await;
        };
        deprecated(model, alias.legacy, alias.canonical);
        if matches!(alias.kind, AliasKind::PresenceOf | AliasKind::ReadOnly) {
            return Err(AirError::read_only(model, name));
        }
        match alias.write(value.into())? {
            Maybe::Set(value) => self.model.set(alias.canonical, value).await,
            Maybe::Clear => self.model.set(alias.canonical, Value::Null).await,
            Maybe::NotProvided => Ok(()),
        }
    }

    /// `update()` with a legacy payload.
    pub async fn update(&mut self, payload: Payload) -> Result<()> {
        let payload = translate_payload(self.table, self.model.schema().name, payload)?;
        self.model.update(payload).await
    }

    /// `full_update()` from older releases; same partial update.
    pub async fn full_update(&mut self, payload: Payload) -> Result<()> {
        deprecated(self.model.schema().name, "full_update", "update()");
        self.update(payload).await
    }

    /// Resolve a reference by legacy name, following derived chains.
    pub async fn resolve(&self, name: &str) -> Result<Option<Model>> {
        let model = self.model.schema().name;
        if let Some(alias) = self.table.field(name) {
            deprecated(model, alias.legacy, alias.canonical);
            return self.model.resolve(alias.canonical).await;
        }
        let Some(chain) = self.table.chain(name) else {
            return self.model.resolve(name).await;
        };
        deprecated(model, chain.legacy, &chain.path.join("."));
        let Some((first, rest)) = chain.path.split_first() else {
            return Ok(None);
        };
        let mut current = self.model.resolve(first).await?;
        for step in rest {
            current = match current {
                Some(next) => next.resolve(step).await?,
                None => return Ok(None),
            };
        }
        Ok(current)
    }

    /// Whether the current state equals `state`, accepting legacy state names.
    pub fn state_matches(&self, state: &str) -> Result<bool> {
        let current = self.model.get_str("state")?;
        if current == state {
            return Ok(true);
        }
        match self.table.states_for(state) {
            Some(states) => {
                deprecated(self.model.schema().name, state, &states.join("|"));
                Ok(states.contains(&current.as_str()))
            }
            None => Ok(false),
        }
    }

    /// Call a legacy instance verb.
    pub async fn call(&mut self, name: &str, args: Payload) -> Result<LegacyOutcome> {
        let (verb, args) = self.route(name, args)?;
        let schema = self.model.schema();
        deprecated(schema.name, verb.name, verb.replacement);

        match verb.route {
            VerbRoute::Canonical(call) => {
                let key = self.model.key();
                let response = self
                    .model
                    .invoke(call.verb, call.body(args, key.as_deref()))
                    .await?;
                self.outcome(response)
            }
            VerbRoute::Batch { verb: batch, list_key } => {
                self.model.ensure_live()?;
                let key = self.model.key().ok_or_else(|| AirError::Unsaved {
                    model: schema.name.to_string(),
                })?;
                let mut body = args.into_map();
                body.insert(list_key.to_string(), json!([{ "id": key }]));
                let response = self
                    .model
                    .endpoint()
                    .invoke(None, batch, Some(Value::Object(body)))
                    .await?;
                Ok(response.map_or(LegacyOutcome::Done, LegacyOutcome::Value))
            }
            VerbRoute::ShiftTimestamp { field, hours } => {
                let current = self.model.get(field)?;
                let text = current.as_str().ok_or_else(|| {
                    AirError::invalid_argument(format!(
                        "cannot {}: '{field}' is not set",
                        verb.name
                    ))
                })?;
                let at = DateTime::parse_from_rfc3339(text).map_err(|e| {
                    AirError::unexpected(None, format!("'{field}' is not an RFC 3339 timestamp: {e}"))
                })?;
                let shifted = (at + ChronoDuration::hours(hours)).to_rfc3339();
                self.model
                    .patch_fields(Payload::new().with(field, shifted.clone()))
                    .await?;
                Ok(LegacyOutcome::Value(Value::String(shifted)))
            }
            VerbRoute::Destroy => {
                self.model.delete().await?;
                Ok(LegacyOutcome::Done)
            }
            VerbRoute::Removed { hint } => Err(AirError::unsupported_legacy(
                format!("{}.{}", schema.name, verb.name),
                hint,
            )),
            VerbRoute::Dispatch { .. } => Err(AirError::config(format!(
                "legacy verb {}.{} dispatches to another dispatcher",
                schema.name, verb.name
            ))),
        }
    }

    fn route(&self, name: &str, mut args: Payload) -> Result<(&'static LegacyVerb, Payload)> {
        let model = self.model.schema().name;
        let verb = self
            .table
            .verb(name)
            .ok_or_else(|| AirError::unsupported_operation(model, name))?;
        let VerbRoute::Dispatch {
            param,
            actions,
            unknown_hint,
        } = verb.route
        else {
            return Ok((verb, args));
        };

        let action = match args.remove(param) {
            Some(Value::String(action)) => action,
            Some(other) => {
                return Err(AirError::invalid_argument(format!(
                    "'{param}' must be a string, got {other}"
                )))
            }
            None => {
                return Err(AirError::invalid_argument(format!(
                    "{name}() requires '{param}'"
                )))
            }
        };
        let target = actions
            .iter()
            .find(|(candidate, _)| *candidate == action)
            .map(|(_, target)| *target)
            .ok_or_else(|| {
                AirError::unsupported_legacy(format!("{model}.{name}({action})"), unknown_hint)
            })?;
        let next = self.table.verb(target).ok_or_else(|| {
            AirError::config(format!("legacy action '{action}' of {model}.{name} has no route"))
        })?;
        Ok((next, args))
    }

    /// A representation of some other resource (e.g. a clone) becomes a
    /// new instance; anything else is returned as-is.
    fn outcome(&self, response: Option<Value>) -> Result<LegacyOutcome> {
        let pk = self.model.schema().primary_key;
        match response {
            Some(Value::Object(map)) => {
                let returned = map.get(pk).and_then(|v| id_from_value(v, pk));
                if returned.is_some() && returned != self.model.key() {
                    let created = self.model.endpoint().materialize(Value::Object(map))?;
                    return Ok(LegacyOutcome::Model(created));
                }
                Ok(LegacyOutcome::Value(Value::Object(map)))
            }
            Some(value) => Ok(LegacyOutcome::Value(value)),
            None => Ok(LegacyOutcome::Done),
        }
    }
}

/// Legacy methods of one endpoint. Obtained from [`EndpointClient::legacy`].
#[derive(Debug, Clone)]
pub struct LegacyEndpoint {
    endpoint: EndpointClient,
    table: &'static AliasTable,
}

impl LegacyEndpoint {
    pub(crate) fn new(endpoint: EndpointClient) -> Self {
        let table = table_for(endpoint.schema().name);
        Self { endpoint, table }
    }

    pub fn endpoint(&self) -> &EndpointClient {
        &self.endpoint
    }

    pub fn translate_payload(&self, payload: Payload) -> Result<Payload> {
        translate_payload(self.table, self.endpoint.schema().name, payload)
    }

    pub fn list(&self, filters: Payload) -> Result<Cursor> {
        let filters = translate_filters(self.table, self.endpoint.schema().name, filters)?;
        self.endpoint.list(filters)
    }

    pub async fn create(&self, payload: Payload) -> Result<Model> {
        let model = self.endpoint.schema().name;
        let payload = payload
            .into_iter()
            .map(|(name, value)| {
                match self.table.create_renames.iter().find(|(legacy, _)| *legacy == name) {
                    Some((legacy, canonical)) => {
                        deprecated(model, legacy, canonical);
                        (canonical.to_string(), value)
                    }
                    None => (name, value),
                }
            })
            .collect::<Payload>();
        let payload = self.translate_payload(payload)?;
        self.endpoint.create(payload).await
    }

    pub async fn update<R: Into<Reference>>(&self, target: R, payload: Payload) -> Result<Model> {
        let payload = self.translate_payload(payload)?;
        self.endpoint.update(target, payload).await
    }

    /// PUT from older releases; sent as a partial update.
    pub async fn put(&self, key: &str, payload: Payload) -> Result<Model> {
        deprecated(self.endpoint.schema().name, "put", "patch()");
        let payload = self.translate_payload(payload)?;
        self.endpoint.patch(key, payload).await
    }

    /// Call a legacy endpoint method by name with keyword-style arguments.
    pub async fn call(&self, name: &str, mut args: Payload) -> Result<LegacyOutcome> {
        let schema = self.endpoint.schema();
        let entry = self
            .table
            .endpoint_verb(name)
            .ok_or_else(|| AirError::unsupported_operation(schema.name, name))?;
        deprecated(schema.name, entry.name, entry.replacement);

        match entry.verb {
            EndpointVerb::List { renames } => {
                let filters = args
                    .into_iter()
                    .map(|(name, value)| {
                        let name = renames
                            .iter()
                            .find(|(legacy, _)| *legacy == name)
                            .map_or(name, |(_, canonical)| canonical.to_string());
                        (name, value)
                    })
                    .collect();
                Ok(LegacyOutcome::Cursor(self.list(filters)?))
            }
            EndpointVerb::Get { id_arg } => {
                let key = self.take_key(&mut args, id_arg)?;
                Ok(LegacyOutcome::Model(self.endpoint.get(key).await?))
            }
            EndpointVerb::Create => Ok(LegacyOutcome::Model(self.create(args).await?)),
            EndpointVerb::Update { id_arg } => {
                let key = self.take_key(&mut args, id_arg)?;
                Ok(LegacyOutcome::Model(self.update(key, args).await?))
            }
            EndpointVerb::Verb(call) => {
                let key = match call.self_param {
                    Some(param) => args
                        .remove(param)
                        .and_then(|v| id_from_value(&v, schema.primary_key)),
                    None => None,
                };
                let response = self
                    .endpoint
                    .invoke(None, call.verb, call.body(args, key.as_deref()))
                    .await?;
                match response {
                    Some(value @ Value::Object(_)) if value.get(schema.primary_key).is_some() => {
                        Ok(LegacyOutcome::Model(self.endpoint.materialize(value)?))
                    }
                    Some(value) => Ok(LegacyOutcome::Value(value)),
                    None => Ok(LegacyOutcome::Done),
                }
            }
            EndpointVerb::Removed { hint } => Err(AirError::unsupported_legacy(
                format!("{}.{name}", schema.name),
                hint,
            )),
        }
    }

    fn take_key(&self, args: &mut Payload, id_arg: &str) -> Result<String> {
        args.remove(id_arg)
            .and_then(|v| id_from_value(&v, self.endpoint.schema().primary_key))
            .ok_or_else(|| AirError::invalid_argument(format!("missing '{id_arg}'")))
    }
}

/// Legacy top-level calls. Obtained from [`AirApi::legacy`].
#[derive(Debug, Clone)]
pub struct LegacyApi {
    api: AirApi,
}

impl LegacyApi {
    pub(crate) fn new(api: AirApi) -> Self {
        Self { api }
    }

    pub fn endpoint(&self, model: &str) -> Result<LegacyEndpoint> {
        Ok(self.api.endpoint_named(model)?.legacy())
    }

    /// Call a legacy method by its unique name, e.g. `get_simulations`.
    pub async fn call(&self, name: &str, args: Payload) -> Result<LegacyOutcome> {
        if let Some((_, hint)) = tables::REMOVED_API_CALLS.iter().find(|(n, _)| *n == name) {
            return Err(AirError::unsupported_legacy(name, *hint));
        }
        let table = tables::ALL
            .iter()
            .find(|t| t.endpoint_verbs.iter().any(|v| v.name == name))
            .ok_or_else(|| AirError::invalid_argument(format!("unknown legacy call '{name}'")))?;
        self.endpoint(table.model)?.call(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::ClientOptions;
    use airsdk_core::Method;
    use airsdk_transport::{CollectionRules, Injection, MemoryTransport};

    struct Fixture {
        server: Arc<MemoryTransport>,
        api: AirApi,
        sim: String,
        node: String,
    }

    fn fixture() -> Fixture {
        let server = Arc::new(
            MemoryTransport::new()
                .with_collection("simulations", CollectionRules::new())
                .with_collection("simulations/nodes", CollectionRules::new())
                .with_collection("simulations/nodes/interfaces", CollectionRules::new())
                .with_collection("images", CollectionRules::new())
                .with_collection("simulations/nodes/interfaces/services", CollectionRules::new())
                .with_collection("resource-budgets", CollectionRules::new())
                .with_collection("manifests", CollectionRules::new())
                .with_collection("marketplace/demos", CollectionRules::new()),
        );
        let sim = server.seed(
            "simulations",
            json!({"name": "lab", "state": "ACTIVE", "sleep_at": "2024-03-01T08:00:00+00:00", "expires_at": null}),
        );
        let node = server.seed(
            "simulations/nodes",
            json!({"name": "leaf01", "simulation": sim, "cpu": 1, "advanced": {"uefi": true, "tpm": false, "secure_boot": true}}),
        );
        let api = AirApi::with_transport(server.clone(), ClientOptions::default()).unwrap();
        Fixture {
            server,
            api,
            sim,
            node,
        }
    }

    #[tokio::test]
    async fn presence_flags_follow_their_timestamps() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        let legacy = sim.legacy();
        assert_eq!(legacy.get("sleep").unwrap(), json!(true));
        assert_eq!(legacy.get("expires").unwrap(), json!(false));
        assert_eq!(legacy.get("sleep").unwrap(), legacy.get("sleep").unwrap());
    }

    #[tokio::test]
    async fn presence_flags_are_read_only() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        let err = sim.legacy().set("sleep", false).await.unwrap_err();
        assert!(matches!(err, AirError::ReadOnlyField { .. }));
        assert!(!sim.is_dirty());
    }

    #[tokio::test]
    async fn renamed_fields_stage_canonical_names() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        sim.legacy().set("title", "renamed").await.unwrap();
        assert_eq!(sim.dirty_fields(), vec!["name".to_string()]);
        assert_eq!(sim.legacy().get("title").unwrap(), json!("renamed"));
        assert_eq!(sim.get("name").unwrap(), json!("renamed"));
    }

    #[tokio::test]
    async fn removed_fields_fail_on_read_and_drop_from_payloads() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        let err = sim.legacy().get("write_ok").unwrap_err();
        assert!(matches!(err, AirError::UnsupportedLegacyCall { .. }));

        let payload = Payload::new()
            .with("title", "renamed")
            .with("metadata", json!({"a": 1}));
        sim.legacy().update(payload).await.unwrap();

        let patch = f
            .server
            .requests()
            .into_iter()
            .find(|r| r.method == Method::Patch)
            .unwrap();
        assert_eq!(patch.body, Some(json!({"name": "renamed"})));
    }

    #[tokio::test]
    async fn sleep_false_clears_and_sleep_true_is_rejected() {
        let f = fixture();
        let endpoint = f.api.simulations().legacy();

        let err = endpoint
            .update(f.sim.as_str(), Payload::new().with("sleep", true))
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::InvalidArgument(_)));
        assert_eq!(f.server.count(Method::Patch, "simulations/"), 0);

        let sim = endpoint
            .update(f.sim.as_str(), Payload::new().with("sleep", false))
            .await
            .unwrap();
        assert_eq!(sim.get("sleep_at").unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn canonical_name_wins_over_legacy_spelling() {
        let f = fixture();
        let payload = f
            .api
            .simulations()
            .legacy()
            .translate_payload(Payload::new().with("title", "old").with("name", "new"))
            .unwrap();
        assert_eq!(payload.get("name"), Some(&json!("new")));
        assert!(!payload.contains("title"));
    }

    #[tokio::test]
    async fn load_starts_and_control_dispatches() {
        let f = fixture();
        f.server.on_item_action("simulations", "start", |record, _| {
            record.insert("state".into(), json!("BOOTING"));
            (204, Value::Null)
        });
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();

        let outcome = sim.legacy().call("load", Payload::new()).await.unwrap();
        assert!(matches!(outcome, LegacyOutcome::Done));
        sim.legacy()
            .call("control", Payload::new().with("action", "load"))
            .await
            .unwrap();
        assert_eq!(f.server.count(Method::Patch, &format!("simulations/{}/start", f.sim)), 2);

        let err = sim
            .legacy()
            .call("control", Payload::new().with("action", "teleport"))
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::UnsupportedLegacyCall { .. }));
    }

    #[tokio::test]
    async fn duplicate_defaults_attempt_start_to_false() {
        let f = fixture();
        f.server.on_collection_action("simulations", "clone", |_, body| {
            let source = body["simulation"].clone();
            (201, json!({"id": "simulation-99", "name": "copy", "state": "INACTIVE", "sleep_at": null, "expires_at": null, "documentation": source}))
        });
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();

        let copy = sim
            .legacy()
            .call("duplicate", Payload::new())
            .await
            .unwrap()
            .into_model()
            .unwrap();
        assert_eq!(copy.key().as_deref(), Some("simulation-99"));

        let request = f
            .server
            .requests()
            .into_iter()
            .find(|r| r.path.starts_with("simulations/clone"))
            .unwrap();
        assert_eq!(
            request.body,
            Some(json!({"simulation": f.sim, "attempt_start": false}))
        );

        f.server.clear_log();
        sim.legacy()
            .call("duplicate", Payload::new().with("start", true))
            .await
            .unwrap();
        let request = f.server.requests().pop().unwrap();
        assert_eq!(request.body.unwrap()["attempt_start"], json!(true));
    }

    #[tokio::test]
    async fn extend_advances_sleep_at() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        let outcome = sim.legacy().call("extend", Payload::new()).await.unwrap();
        assert!(matches!(outcome, LegacyOutcome::Value(_)));

        let stored = f.server.record("simulations", &f.sim).unwrap();
        let at = DateTime::parse_from_rfc3339(stored["sleep_at"].as_str().unwrap()).unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-03-01T20:00:00+00:00").unwrap();
        assert_eq!(at, expected);
        assert!(!sim.is_dirty());
    }

    #[tokio::test]
    async fn rejected_extend_leaves_staged_edits_alone() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        sim.set("name", "lab-2").await.unwrap();

        f.server.inject(Injection::Status(
            400,
            json!({"sleep_at": ["Sleep time is past the expiry."]}),
        ));
        let err = sim.legacy().call("extend", Payload::new()).await.unwrap_err();
        assert!(matches!(err, AirError::ValidationRejected { .. }));
        assert_eq!(sim.dirty_fields(), vec!["name"]);
        assert_eq!(sim.get("sleep_at").unwrap(), json!("2024-03-01T08:00:00+00:00"));

        sim.save().await.unwrap();
        let patch = f.server.requests().pop().unwrap();
        assert_eq!(patch.body, Some(json!({"name": "lab-2"})));
    }

    #[tokio::test]
    async fn extend_sends_only_the_timestamp() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        sim.set("name", "lab-2").await.unwrap();

        sim.legacy().call("extend", Payload::new()).await.unwrap();
        let patch = f.server.requests().pop().unwrap();
        let body = patch.body.unwrap();
        assert!(body.get("name").is_none());
        assert!(body.get("sleep_at").is_some());
        assert_eq!(sim.dirty_fields(), vec!["name"]);
        assert_eq!(f.server.record("simulations", &f.sim).unwrap()["name"], "lab");
    }

    #[tokio::test]
    async fn extend_needs_a_sleep_time() {
        let f = fixture();
        f.server
            .update_record("simulations", &f.sim, json!({"sleep_at": null}));
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        let err = sim.legacy().call("extend", Payload::new()).await.unwrap_err();
        assert!(matches!(err, AirError::InvalidArgument(_)));
        assert_eq!(f.server.count(Method::Patch, "simulations/"), 0);
    }

    #[tokio::test]
    async fn removed_verbs_fail_without_requests() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        f.server.clear_log();
        let err = sim.legacy().call("preferences", Payload::new()).await.unwrap_err();
        assert!(matches!(err, AirError::UnsupportedLegacyCall { .. }));
        assert!(f.server.requests().is_empty());
    }

    #[tokio::test]
    async fn legacy_states_cover_canonical_ones() {
        let f = fixture();
        let mut sim = f.api.simulations().get(f.sim.as_str()).await.unwrap();
        let legacy = sim.legacy();
        assert!(legacy.state_matches("ACTIVE").unwrap());
        assert!(legacy.state_matches("LOADED").unwrap());
        assert!(!legacy.state_matches("STORED").unwrap());
    }

    #[tokio::test]
    async fn node_reset_goes_through_bulk_reset() {
        let f = fixture();
        f.server
            .on_collection_action("simulations/nodes", "bulk-reset", |_, _| (204, Value::Null));
        let mut node = f.api.nodes().get(f.node.as_str()).await.unwrap();
        node.legacy()
            .call("control", Payload::new().with("action", "reset"))
            .await
            .unwrap();

        let request = f.server.requests().pop().unwrap();
        assert_eq!(request.method, Method::Post);
        assert!(request.path.starts_with("simulations/nodes/bulk-reset"));
        assert_eq!(request.body, Some(json!({"nodes": [{"id": f.node}]})));

        let err = node
            .legacy()
            .call("set_agent_key", Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::UnsupportedLegacyCall { .. }));
    }

    #[tokio::test]
    async fn node_features_map_to_advanced() {
        let f = fixture();
        let mut node = f.api.nodes().get(f.node.as_str()).await.unwrap();
        let features: Value =
            serde_json::from_str(node.legacy().get("features").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(features, json!({"uefi": true, "tpm": false}));

        let payload = f
            .api
            .nodes()
            .legacy()
            .translate_payload(Payload::new().with("features", r#"{"uefi": false, "cdrom": 1}"#))
            .unwrap();
        assert_eq!(payload.get("advanced"), Some(&json!({"uefi": false})));

        let payload = f
            .api
            .nodes()
            .legacy()
            .translate_payload(Payload::new().with("features", r#"{"cdrom": 1}"#))
            .unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn interface_simulation_resolves_through_node() {
        let f = fixture();
        let iface = f.server.seed(
            "simulations/nodes/interfaces",
            json!({"name": "eth0", "node": f.node}),
        );
        let mut iface = f.api.interfaces().get(iface.as_str()).await.unwrap();
        let sim = iface.legacy().resolve("simulation").await.unwrap().unwrap();
        assert_eq!(sim.key(), Some(f.sim.clone()));
    }

    #[tokio::test]
    async fn endpoint_aliases_route_to_canonical_operations() {
        let f = fixture();
        let nodes = f.api.nodes().legacy();

        let cursor = nodes
            .call("get_nodes", Payload::new().with("simulation_id", f.sim.as_str()))
            .await
            .unwrap()
            .into_cursor()
            .unwrap();
        assert_eq!(cursor.collect().await.unwrap().len(), 1);
        let list = f.server.requests().pop().unwrap();
        assert_eq!(list.query_value("simulation"), Some(f.sim.as_str()));

        let node = nodes
            .call(
                "update_simulation_node",
                Payload::new()
                    .with("simulation_node_id", f.node.as_str())
                    .with("name", "spine01"),
            )
            .await
            .unwrap()
            .into_model()
            .unwrap();
        assert_eq!(node.get("name").unwrap(), json!("spine01"));

        nodes
            .put(&f.node, Payload::new().with("cpu", 2))
            .await
            .unwrap();
        assert_eq!(f.server.count(Method::Put, "simulations/nodes/"), 0);
        assert_eq!(f.server.count(Method::Patch, "simulations/nodes/"), 2);

        let err = nodes
            .call("bulk_update_state", Payload::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AirError::UnsupportedLegacyCall { .. }));
    }

    #[tokio::test]
    async fn api_level_calls_find_their_endpoint() {
        let f = fixture();
        let legacy = f.api.legacy();

        let sim = legacy
            .call("get_simulation", Payload::new().with("simulation_id", f.sim.as_str()))
            .await
            .unwrap()
            .into_model()
            .unwrap();
        assert_eq!(sim.get("name").unwrap(), json!("lab"));

        let err = legacy.call("breakouts", Payload::new()).await.unwrap_err();
        assert!(matches!(err, AirError::UnsupportedLegacyCall { .. }));

        let err = legacy.call("no_such_call", Payload::new()).await.unwrap_err();
        assert!(matches!(err, AirError::InvalidArgument(_)));
    }

    #[test]
    fn alias_writes_carry_three_states() {
        let title = FieldAlias::rename("title", "name");
        assert_eq!(title.write(json!("lab")).unwrap(), Maybe::Set(json!("lab")));
        assert_eq!(title.write(Value::Null).unwrap(), Maybe::Clear);

        let sleep = FieldAlias::presence("sleep", "sleep_at");
        assert_eq!(sleep.write(json!(false)).unwrap(), Maybe::Clear);

        let organization = FieldAlias::read_only("organization", "org_name");
        assert_eq!(organization.write(json!("acme")).unwrap(), Maybe::NotProvided);
        assert_eq!(organization.read(json!("acme")), json!("acme"));
    }

    #[tokio::test]
    async fn service_ports_and_simulation_chain() {
        let f = fixture();
        let iface = f.server.seed(
            "simulations/nodes/interfaces",
            json!({"name": "eth0", "node": f.node}),
        );
        let services = f.api.services().legacy();

        let created = services
            .call(
                "create_service",
                Payload::new()
                    .with("name", "ssh")
                    .with("interface", iface.as_str())
                    .with("dest_port", 22)
                    .with("simulation_id", f.sim.as_str()),
            )
            .await
            .unwrap()
            .into_model()
            .unwrap();
        let post = f.server.requests().pop().unwrap();
        let body = post.body.unwrap();
        assert_eq!(body["node_port"], json!(22));
        assert!(body.get("simulation").is_none());
        assert!(body.get("simulation_id").is_none());

        let mut service = created;
        let legacy = service.legacy();
        assert_eq!(legacy.get("dest_port").unwrap(), json!(22));
        let sim = legacy.resolve("simulation").await.unwrap().unwrap();
        assert_eq!(sim.key(), Some(f.sim.clone()));

        services
            .call("get_services", Payload::new().with("simulation_id", f.sim.as_str()))
            .await
            .unwrap()
            .into_cursor()
            .unwrap()
            .collect()
            .await
            .unwrap();
        let list = f.server.requests().pop().unwrap();
        assert_eq!(list.query_value("simulation"), Some(f.sim.as_str()));
    }

    #[tokio::test]
    async fn organization_budget_names() {
        let f = fixture();
        let org = f.server.seed(
            "resource-budgets",
            json!({"org_display_name": "Acme", "disk_storage_total": 500}),
        );
        let mut org = f.api.organizations().get(org.as_str()).await.unwrap();
        let legacy = org.legacy();
        assert_eq!(legacy.get("name").unwrap(), json!("Acme"));
        assert_eq!(legacy.get("storage").unwrap(), json!(500));
        assert!(matches!(
            legacy.get("member_count").unwrap_err(),
            AirError::UnsupportedLegacyCall { .. }
        ));

        let cursor = f
            .api
            .organizations()
            .legacy()
            .list(Payload::new().with("name", "Acme").with("resource_budget", "rb-1"))
            .unwrap();
        assert_eq!(cursor.collect().await.unwrap().len(), 1);
        let list = f.server.requests().pop().unwrap();
        assert_eq!(list.query_value("org_display_name"), Some("Acme"));
        assert_eq!(list.query_value("resource_budget"), None);
    }

    #[tokio::test]
    async fn manifest_organization_is_read_only() {
        let f = fixture();
        let manifests = f.api.manifests().legacy();
        let created = manifests
            .create(
                Payload::new()
                    .with("emulation_type", "NIC")
                    .with("organization", "acme")
                    .with("owner", "someone"),
            )
            .await
            .unwrap();
        let post = f.server.requests().pop().unwrap();
        let body = post.body.unwrap();
        assert!(body.get("organization").is_none());
        assert!(body.get("org_name").is_none());
        assert!(body.get("owner").is_none());

        f.server.update_record(
            "manifests",
            &created.key().unwrap(),
            json!({"org_name": "acme"}),
        );
        let mut manifest = f.api.manifests().get(created.key().unwrap().as_str()).await.unwrap();
        let mut legacy = manifest.legacy();
        assert_eq!(legacy.get("organization").unwrap(), json!("acme"));
        let err = legacy.set("organization", "other").await.unwrap_err();
        assert!(matches!(err, AirError::ReadOnlyField { .. }));
    }

    #[tokio::test]
    async fn marketplace_snapshot_means_simulation_on_create() {
        let f = fixture();
        let demos = f.api.marketplace_demos().legacy();
        demos
            .create(Payload::new().with("name", "evpn").with("snapshot", f.sim.as_str()))
            .await
            .unwrap();
        let post = f.server.requests().pop().unwrap();
        let body = post.body.unwrap();
        assert_eq!(body["simulation"], json!(f.sim));
        assert!(body.get("demo").is_none());

        let demo = f.server.seed(
            "marketplace/demos",
            json!({"name": "evpn", "demo": f.sim, "creator": "a@example.com", "liked_by_client": true}),
        );
        let mut demo = f.api.marketplace_demos().get(demo.as_str()).await.unwrap();
        let legacy = demo.legacy();
        assert_eq!(legacy.get("snapshot").unwrap(), json!(f.sim));
        assert_eq!(legacy.get("owner").unwrap(), json!("a@example.com"));
        assert_eq!(legacy.get("liked_by_account").unwrap(), json!(true));
    }

    #[test]
    fn models_without_legacy_names_get_an_empty_table() {
        let table = table_for("SshKey");
        assert!(table.fields.is_empty());
        assert!(table.verb("load").is_none());
        assert!(table.endpoint_verb("put").is_some());
    }
}
