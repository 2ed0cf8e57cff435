//! Model instances.
//!
//! A [`Model`] is a local handle to one remote resource. Its last-known
//! server state lives in a [`Record`] shared with every other handle of the
//! same primary key; local edits are staged per handle until [`Model::save`]
//! sends them as one PATCH (or, for types configured with
//! [`FlushMode::Immediate`], on every [`Model::set`]).
//!
//! Relationship fields hold identifiers. [`Model::resolve`] turns one into a
//! live instance, fetching it at most once per handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use airsdk_core::{
    AirError, FieldDescriptor, FieldKind, FlushMode, ModelSchema, Operation, Payload, Result,
    VerbScope, WritePolicy,
};

use crate::compat::LegacyModel;
use crate::endpoint::{normalize_reference, EndpointClient};
use crate::identity::Record;
use crate::reference::{id_from_value, Reference};

#[derive(Debug)]
enum Resolved {
    One(Option<Model>),
    Many(Vec<Model>),
}

type Slot = Arc<OnceCell<Resolved>>;

/// Previous pending value and slot of one field, for rollback.
struct Undo {
    field: String,
    pending: Option<Value>,
    slot: Option<Slot>,
}

/// Local handle to one remote resource.
pub struct Model {
    endpoint: EndpointClient,
    record: Arc<Record>,
    pending: Map<String, Value>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Model {
    pub(crate) fn from_record(endpoint: EndpointClient, record: Arc<Record>) -> Self {
        Self {
            endpoint,
            record,
            pending: Map::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn draft(endpoint: EndpointClient, pending: Map<String, Value>) -> Self {
        let record = Record::detached(endpoint.schema().name);
        Self {
            endpoint,
            record,
            pending,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn record(&self) -> &Arc<Record> {
        &self.record
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.endpoint.schema()
    }

    pub fn endpoint(&self) -> &EndpointClient {
        &self.endpoint
    }

    /// Primary key, `None` until the instance has been created.
    pub fn key(&self) -> Option<String> {
        self.record.key().map(str::to_string)
    }

    pub fn is_saved(&self) -> bool {
        self.record.key().is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.record.is_deleted()
    }

    /// Whether both handles point at the same server-side resource.
    pub fn same_resource(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    /// Fails with `StaleReference` once the resource has been deleted.
    pub fn ensure_live(&self) -> Result<()> {
        if self.record.is_deleted() {
            return Err(AirError::stale(
                self.schema().name,
                self.key().unwrap_or_default(),
            ));
        }
        Ok(())
    }

    fn require_key(&self) -> Result<String> {
        self.ensure_live()?;
        self.key().ok_or_else(|| AirError::Unsaved {
            model: self.schema().name.to_string(),
        })
    }

    fn target_pk(&self, field: &FieldDescriptor) -> &'static str {
        field
            .target()
            .and_then(|target| self.endpoint.ctx().schema(target).ok())
            .map(|schema| schema.primary_key)
            .unwrap_or("id")
    }

    /// Staged value if any, otherwise the stored one; unnormalized.
    fn raw_value(&self, field: &str) -> Option<Value> {
        self.pending
            .get(field)
            .cloned()
            .or_else(|| self.record.get(field))
    }

    fn id_form(&self, field: &FieldDescriptor, value: Value) -> Value {
        let pk = self.target_pk(field);
        normalize_reference(field, value.clone(), pk).unwrap_or(value)
    }

    /// Current value of `field`, staged edits included.
    ///
    /// Relationship fields read as their identifier (or list of
    /// identifiers); use [`Model::resolve`] for the instance. A lazy field
    /// that was never loaded is an error rather than a silent `null`.
    pub fn get(&self, field: &str) -> Result<Value> {
        self.ensure_live()?;
        let descriptor = *self.schema().require_field(field)?;
        match self.raw_value(field) {
            Some(value) => Ok(self.id_form(&descriptor, value)),
            None if descriptor.lazy && self.is_saved() => Err(AirError::invalid_argument(format!(
                "{}.{field} is not loaded; call load(\"{field}\") first",
                self.schema().name
            ))),
            None => Ok(Value::Null),
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        Ok(serde_json::from_value(self.get(field)?)?)
    }

    pub fn get_str(&self, field: &str) -> Result<String> {
        match self.get(field)? {
            Value::String(s) => Ok(s),
            other => Err(AirError::invalid_argument(format!(
                "{}.{field} is not a string: {other}",
                self.schema().name
            ))),
        }
    }

    /// Every known field with staged edits applied.
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = self.record.fields();
        fields.extend(self.pending.clone());
        fields
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Names of fields changed locally since the last successful sync.
    pub fn dirty_fields(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Drop staged edits without contacting the server.
    pub fn discard_changes(&mut self) {
        let fields: Vec<String> = self.pending.keys().cloned().collect();
        self.pending.clear();
        let mut slots = self.slots.lock();
        for field in fields {
            slots.remove(&field);
        }
    }

    fn validate_write(&self, field: &str, value: Value) -> Result<(&'static FieldDescriptor, Value)> {
        self.ensure_live()?;
        let schema = self.schema();
        let descriptor = schema.require_field(field)?;
        if descriptor.name == schema.primary_key || descriptor.policy != WritePolicy::ReadWrite {
            return Err(AirError::read_only(schema.name, field));
        }
        if value.is_null() && !descriptor.nullable {
            return Err(AirError::invalid_argument(format!(
                "{}.{field} cannot be null",
                schema.name
            )));
        }
        let value = normalize_reference(descriptor, value, self.target_pk(descriptor))?;
        Ok((descriptor, value))
    }

    fn stage(&mut self, descriptor: &FieldDescriptor, value: Value, slot: Option<Slot>) -> Undo {
        let field = descriptor.name.to_string();
        let stored = self
            .record
            .get(&field)
            .map(|stored| self.id_form(descriptor, stored));

        let previous = if self.is_saved() && stored.as_ref() == Some(&value) {
            self.pending.remove(&field)
        } else {
            self.pending.insert(field.clone(), value)
        };

        let mut slots = self.slots.lock();
        let previous_slot = match slot {
            Some(slot) => slots.insert(field.clone(), slot),
            None => slots.remove(&field),
        };
        Undo {
            field,
            pending: previous,
            slot: previous_slot,
        }
    }

    fn restore(&mut self, undo: Vec<Undo>) {
        let mut slots = self.slots.lock();
        for entry in undo.into_iter().rev() {
            match entry.pending {
                Some(value) => self.pending.insert(entry.field.clone(), value),
                None => self.pending.remove(&entry.field),
            };
            match entry.slot {
                Some(slot) => slots.insert(entry.field, slot),
                None => slots.remove(&entry.field),
            };
        }
    }

    async fn flush_if_immediate(&mut self, undo: Vec<Undo>) -> Result<()> {
        if self.endpoint.flush_mode() != FlushMode::Immediate || !self.is_saved() {
            return Ok(());
        }
        if let Err(err) = self.save().await {
            self.restore(undo);
            return Err(err);
        }
        Ok(())
    }

    /// Stage a new value for `field`.
    ///
    /// Rejected locally: unknown fields, the primary key, server-assigned
    /// and client-hint fields, `null` for non-nullable fields. In
    /// immediate-flush mode the change is sent right away; if that fails
    /// the staged state is rolled back before the error is returned.
    pub async fn set<V: Into<Value>>(&mut self, field: &str, value: V) -> Result<()> {
        let (descriptor, value) = self.validate_write(field, value.into())?;
        let undo = self.stage(descriptor, value, None);
        self.flush_if_immediate(vec![undo]).await
    }

    /// Point a relationship field at `target`.
    ///
    /// Passing an instance also primes the relationship, so a following
    /// [`Model::resolve`] returns it without a request.
    pub async fn set_reference<R: Into<Reference>>(&mut self, field: &str, target: R) -> Result<()> {
        let target = target.into();
        let descriptor = self.schema().require_field(field)?;
        if !matches!(descriptor.kind, FieldKind::Reference { .. }) {
            return Err(AirError::invalid_argument(format!(
                "{}.{field} is not a single reference",
                self.schema().name
            )));
        }
        let (descriptor, value) = self.validate_write(field, Value::String(target.key()?))?;
        let slot = target
            .instance()
            .map(|model| Arc::new(OnceCell::new_with(Some(Resolved::One(Some(model.clone()))))));
        let undo = self.stage(descriptor, value, slot);
        self.flush_if_immediate(vec![undo]).await
    }

    fn stage_payload(&mut self, payload: Payload) -> Result<Vec<Undo>> {
        let validated = payload
            .into_iter()
            .map(|(field, value)| self.validate_write(&field, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(validated
            .into_iter()
            .map(|(descriptor, value)| self.stage(descriptor, value, None))
            .collect())
    }

    /// Stage several fields at once. Nothing is staged if any is invalid;
    /// in immediate-flush mode they go out in a single PATCH.
    pub async fn set_many<P: Into<Payload>>(&mut self, payload: P) -> Result<()> {
        let undo = self.stage_payload(payload.into())?;
        self.flush_if_immediate(undo).await
    }

    /// Send staged edits.
    ///
    /// An unsaved instance is created. A clean instance sends nothing.
    /// Otherwise only the dirty fields are PATCHed; on success the server's
    /// representation replaces local state for every handle and the dirty
    /// set is cleared. On failure local state is untouched.
    pub async fn save(&mut self) -> Result<()> {
        self.ensure_live()?;
        let Some(key) = self.key() else {
            self.schema().ensure(Operation::Create)?;
            let record = self.endpoint.create_record(self.pending.clone()).await?;
            self.record = record;
            self.pending.clear();
            return Ok(());
        };

        if self.pending.is_empty() {
            return Ok(());
        }
        self.schema().ensure(Operation::Patch)?;

        let record = self.endpoint.patch_record(&key, self.pending.clone()).await?;
        let flushed: Vec<String> = self.pending.keys().cloned().collect();
        self.record = record;
        self.pending.clear();
        self.drop_mismatched_slots(&flushed);
        Ok(())
    }

    /// Keep a primed relationship only if the server agreed with it.
    fn drop_mismatched_slots(&self, fields: &[String]) {
        let mut slots = self.slots.lock();
        for field in fields {
            let current = self
                .record
                .get(field)
                .and_then(|v| id_from_value(&v, "id"));
            let keep = match slots.get(field).and_then(|slot| slot.get()) {
                Some(Resolved::One(Some(model))) => model.key().is_some() && model.key() == current,
                _ => false,
            };
            if !keep {
                slots.remove(field);
            }
        }
    }

    /// Stage `payload` and save. Staged state is rolled back if the save fails.
    pub async fn update<P: Into<Payload>>(&mut self, payload: P) -> Result<()> {
        let undo = self.stage_payload(payload.into())?;
        if let Err(err) = self.save().await {
            self.restore(undo);
            return Err(err);
        }
        Ok(())
    }

    /// PATCH only `payload`, leaving other staged edits staged.
    ///
    /// Nothing is staged on failure. On success the server's representation
    /// replaces local state and the sent fields are no longer dirty.
    pub async fn patch_fields<P: Into<Payload>>(&mut self, payload: P) -> Result<()> {
        let key = self.require_key()?;
        self.schema().ensure(Operation::Patch)?;
        let mut body = Map::new();
        for (field, value) in payload.into() {
            let (descriptor, value) = self.validate_write(&field, value)?;
            body.insert(descriptor.name.to_string(), value);
        }
        if body.is_empty() {
            return Ok(());
        }

        let sent: Vec<String> = body.keys().cloned().collect();
        self.record = self.endpoint.patch_record(&key, body).await?;
        for field in &sent {
            self.pending.remove(field);
        }
        self.drop_mismatched_slots(&sent);
        Ok(())
    }

    /// Re-fetch from the server, discarding staged edits and resolved
    /// relationships.
    pub async fn refresh(&mut self) -> Result<()> {
        let key = self.require_key()?;
        self.record = self.endpoint.fetch_record(&key).await?;
        self.pending.clear();
        self.slots.lock().clear();
        Ok(())
    }

    /// Re-fetch server state while keeping staged edits.
    async fn reload(&mut self) -> Result<()> {
        let key = self.require_key()?;
        self.record = self.endpoint.fetch_record(&key).await?;
        Ok(())
    }

    /// Delete the resource. Every handle of it becomes stale.
    pub async fn delete(&self) -> Result<()> {
        self.schema().ensure(Operation::Delete)?;
        let key = self.require_key()?;
        self.endpoint.delete_key(&key).await?;
        self.endpoint.ctx().identity.mark_record_deleted(&self.record);
        Ok(())
    }

    /// Value of a lazy field, fetching the full representation the first
    /// time it is needed.
    pub async fn load(&mut self, field: &str) -> Result<Value> {
        self.ensure_live()?;
        let descriptor = *self.schema().require_field(field)?;
        if self.pending.contains_key(field) || self.record.contains(field) {
            return self.get(field);
        }
        if self.is_saved() {
            self.reload().await?;
        }
        Ok(self
            .raw_value(field)
            .map(|value| self.id_form(&descriptor, value))
            .unwrap_or(Value::Null))
    }

    fn slot(&self, field: &str) -> Slot {
        self.slots
            .lock()
            .entry(field.to_string())
            .or_default()
            .clone()
    }

    /// The instance a single-reference field points at; `None` for null.
    ///
    /// Fetched at most once per handle; concurrent callers share the
    /// first fetch. An embedded representation is used without a request.
    pub async fn resolve(&self, field: &str) -> Result<Option<Model>> {
        self.ensure_live()?;
        let descriptor = *self.schema().require_field(field)?;
        let FieldKind::Reference { target } = descriptor.kind else {
            return Err(AirError::invalid_argument(format!(
                "{}.{field} is not a single reference",
                self.schema().name
            )));
        };

        let slot = self.slot(field);
        let resolved = slot
            .get_or_try_init(|| async move {
                let endpoint = self.endpoint.sibling(target)?;
                let value = self.raw_value(field).unwrap_or(Value::Null);
                Ok::<_, AirError>(Resolved::One(resolve_value(&endpoint, value).await?))
            })
            .await?;

        match resolved {
            Resolved::One(model) => Ok(model.clone()),
            Resolved::Many(_) => Err(AirError::invalid_argument(format!(
                "{}.{field} is not a single reference",
                self.schema().name
            ))),
        }
    }

    /// Instances a reference-list field points at, in stored order.
    pub async fn resolve_many(&self, field: &str) -> Result<Vec<Model>> {
        self.ensure_live()?;
        let descriptor = *self.schema().require_field(field)?;
        let FieldKind::ReferenceList { target } = descriptor.kind else {
            return Err(AirError::invalid_argument(format!(
                "{}.{field} is not a reference list",
                self.schema().name
            )));
        };

        let slot = self.slot(field);
        let resolved = slot
            .get_or_try_init(|| async move {
                let endpoint = self.endpoint.sibling(target)?;
                let items = match self.raw_value(field) {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        return Err(AirError::unexpected(
                            None,
                            format!("{}.{field} is not a list: {other}", self.schema().name),
                        ))
                    }
                };
                let models = futures::future::try_join_all(
                    items.into_iter().map(|item| resolve_value(&endpoint, item)),
                )
                .await?;
                Ok::<_, AirError>(Resolved::Many(models.into_iter().flatten().collect()))
            })
            .await?;

        match resolved {
            Resolved::Many(models) => Ok(models.clone()),
            Resolved::One(_) => Err(AirError::invalid_argument(format!(
                "{}.{field} is not a reference list",
                self.schema().name
            ))),
        }
    }

    /// Endpoint of `model` scoped to resources whose `filter` is this instance,
    /// e.g. `sim.related("Node", "simulation")`.
    pub fn related(&self, model: &str, filter: &str) -> Result<EndpointClient> {
        self.endpoint.sibling(model)?.scoped(filter, self)
    }

    /// Dispatch a business verb on this instance (or its collection).
    ///
    /// When the server answers with this resource's representation, local
    /// state is updated from it.
    pub async fn invoke(&self, verb: &str, body: Option<Value>) -> Result<Option<Value>> {
        self.ensure_live()?;
        let schema = self.schema();
        let descriptor = schema
            .verb(verb)
            .ok_or_else(|| AirError::unsupported_operation(schema.name, verb))?;
        let key = match descriptor.scope {
            VerbScope::Instance => Some(self.require_key()?),
            VerbScope::Collection => None,
        };

        let response = self.endpoint.invoke(key.as_deref(), verb, body).await?;
        if let (Some(key), Some(Value::Object(map))) = (&key, &response) {
            let returned = map
                .get(schema.primary_key)
                .and_then(|v| id_from_value(v, schema.primary_key));
            if returned.as_deref() == Some(key.as_str()) {
                self.endpoint.record_from_object(map.clone())?;
            }
        }
        Ok(response)
    }

    /// Poll until `state` reaches one of `targets`.
    ///
    /// Fails as soon as a state in `failures` is observed, or with
    /// `Timeout` once `timeout` has elapsed. Staged edits are kept.
    pub async fn wait_for_state(
        &mut self,
        targets: &[&str],
        failures: &[&str],
        timeout: Duration,
        poll: Duration,
    ) -> Result<String> {
        self.schema().require_field("state")?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.reload().await?;
            let state = self.get_str("state")?;
            if targets.contains(&state.as_str()) {
                return Ok(state);
            }
            if failures.contains(&state.as_str()) {
                return Err(AirError::unexpected(
                    None,
                    format!(
                        "{} '{}' entered state {state}",
                        self.schema().name,
                        self.key().unwrap_or_default()
                    ),
                ));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AirError::Timeout(timeout));
            }
            tracing::debug!(model = self.schema().name, %state, "waiting for state change");
            tokio::time::sleep(poll).await;
        }
    }

    /// Legacy field and verb names over this instance.
    pub fn legacy(&mut self) -> LegacyModel<'_> {
        LegacyModel::new(self)
    }
}

/// Materialize a stored reference value: `null` is `None`, an embedded
/// representation is used as-is, anything else is fetched by id.
async fn resolve_value(endpoint: &EndpointClient, value: Value) -> Result<Option<Model>> {
    let pk = endpoint.schema().primary_key;
    match value {
        Value::Null => Ok(None),
        Value::Object(map) if map.len() > 1 && map.contains_key(pk) => {
            endpoint.materialize(Value::Object(map)).map(Some)
        }
        other => {
            let id = id_from_value(&other, pk).ok_or_else(|| {
                AirError::unexpected(None, format!("cannot resolve reference from {other}"))
            })?;
            endpoint.get(id).await.map(Some)
        }
    }
}

impl Clone for Model {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            record: self.record.clone(),
            pending: self.pending.clone(),
            slots: Mutex::new(self.slots.lock().clone()),
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("model", &self.schema().name)
            .field("key", &self.record.key())
            .field("deleted", &self.record.is_deleted())
            .field("dirty", &self.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}
