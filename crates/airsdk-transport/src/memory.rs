//! In-process fake of the resource API.
//!
//! [`MemoryTransport`] keeps collections of JSON records keyed by endpoint
//! path and answers requests with the same status codes and list envelope
//! the real service uses: `201` on create, `204` on delete, `404` for
//! unknown keys, `400` with per-field detail on validation failures and
//! `{count, next, previous, results}` for lists. Every request is logged so
//! tests can assert on exactly what went over the wire.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use airsdk_core::{AirError, Method, Result};

use crate::{ApiRequest, ApiResponse, Transport};

type Record = Map<String, Value>;

/// Handler for `{collection}/{id}/{verb}/`; receives the stored record and the request body.
pub type ItemAction = Arc<dyn Fn(&mut Record, &Value) -> (u16, Value) + Send + Sync>;

/// Handler for `{collection}/{verb}/`; receives every stored record and the request body.
pub type CollectionAction = Arc<dyn Fn(&mut Vec<Record>, &Value) -> (u16, Value) + Send + Sync>;

/// Server-side behaviour of one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionRules {
    /// Fields that must be present on create.
    pub required: Vec<String>,
    /// Fields the server refuses to accept in create/update bodies.
    pub read_only: Vec<String>,
    /// Values filled in on create when the body omits them.
    pub defaults: Record,
}

impl CollectionRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require<S: Into<String>>(mut self, field: S) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn read_only<S: Into<String>>(mut self, field: S) -> Self {
        self.read_only.push(field.into());
        self
    }

    pub fn default_value<S: Into<String>>(mut self, field: S, value: Value) -> Self {
        self.defaults.insert(field.into(), value);
        self
    }
}

/// A request as received by the fake server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A canned failure returned for the next request instead of normal handling.
#[derive(Debug, Clone)]
pub enum Injection {
    Status(u16, Value),
    Timeout,
}

#[derive(Default)]
struct Collection {
    rules: CollectionRules,
    items: Vec<Record>,
    item_actions: HashMap<String, ItemAction>,
    collection_actions: HashMap<String, CollectionAction>,
}

#[derive(Default)]
struct ServerState {
    collections: BTreeMap<String, Collection>,
    log: Vec<RecordedRequest>,
    injected: VecDeque<Injection>,
    next_id: u64,
}

/// In-memory [`Transport`] implementation.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<ServerState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style collection registration.
    pub fn with_collection(self, path: &str, rules: CollectionRules) -> Self {
        self.add_collection(path, rules);
        self
    }

    pub fn add_collection(&self, path: &str, rules: CollectionRules) {
        let mut state = self.state.lock();
        let collection = state.collections.entry(normalize(path)).or_default();
        collection.rules = rules;
    }

    /// Insert a record directly, assigning an `id` when missing. Returns the id.
    pub fn seed(&self, path: &str, record: Value) -> String {
        let mut state = self.state.lock();
        let id = match record.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                state.next_id += 1;
                format!("{}-{}", id_prefix(path), state.next_id)
            }
        };
        let mut record = match record {
            Value::Object(map) => map,
            _ => Record::new(),
        };
        record.insert("id".to_string(), Value::String(id.clone()));
        state
            .collections
            .entry(normalize(path))
            .or_default()
            .items
            .push(record);
        id
    }

    /// Current server-side copy of a record.
    pub fn record(&self, path: &str, id: &str) -> Option<Value> {
        let state = self.state.lock();
        state
            .collections
            .get(&normalize(path))
            .and_then(|c| c.items.iter().find(|r| record_id(r) == Some(id)))
            .map(|r| Value::Object(r.clone()))
    }

    /// Change a record behind the client's back (a concurrent writer).
    pub fn update_record(&self, path: &str, id: &str, changes: Value) -> bool {
        let mut state = self.state.lock();
        let Some(item) = state
            .collections
            .get_mut(&normalize(path))
            .and_then(|c| c.items.iter_mut().find(|r| record_id(r) == Some(id)))
        else {
            return false;
        };
        if let Value::Object(changes) = changes {
            item.extend(changes);
        }
        true
    }

    pub fn on_item_action<F>(&self, path: &str, verb: &str, handler: F)
    where
        F: Fn(&mut Record, &Value) -> (u16, Value) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        state
            .collections
            .entry(normalize(path))
            .or_default()
            .item_actions
            .insert(verb.trim_matches('/').to_string(), Arc::new(handler));
    }

    pub fn on_collection_action<F>(&self, path: &str, verb: &str, handler: F)
    where
        F: Fn(&mut Vec<Record>, &Value) -> (u16, Value) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        state
            .collections
            .entry(normalize(path))
            .or_default()
            .collection_actions
            .insert(verb.trim_matches('/').to_string(), Arc::new(handler));
    }

    /// Queue a failure for the next request.
    pub fn inject(&self, injection: Injection) {
        self.state.lock().injected.push_back(injection);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().log.clone()
    }

    /// Number of logged requests with `method` whose path starts with `prefix`.
    pub fn count(&self, method: Method, prefix: &str) -> usize {
        let prefix = prefix.trim_start_matches('/');
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    fn handle(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut state = self.state.lock();
        state.log.push(RecordedRequest {
            method: request.method,
            path: request.path.trim_start_matches('/').to_string(),
            query: request.query.clone(),
            body: request.body.clone(),
        });

        if let Some(injection) = state.injected.pop_front() {
            return match injection {
                Injection::Status(status, body) => Ok(ApiResponse::new(status, Some(body))),
                Injection::Timeout => Err(AirError::Timeout(
                    request.timeout.unwrap_or(Duration::from_secs(61)),
                )),
            };
        }

        let path = normalize(&request.path);
        let Some(key) = state
            .collections
            .keys()
            .filter(|k| path == **k || path.starts_with(&format!("{k}/")))
            .max_by_key(|k| k.len())
            .cloned()
        else {
            return Ok(not_found());
        };

        let rest: Vec<String> = path[key.len()..]
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let next_id = state.next_id + 1;
        let Some(collection) = state.collections.get_mut(&key) else {
            return Ok(not_found());
        };
        let body = request.body.clone().unwrap_or(Value::Null);

        let (response, consumed_id) = match (request.method, rest.as_slice()) {
            (Method::Get, []) => (list(&key, collection, &request.query), false),
            (Method::Post, []) => create(&key, collection, &body, next_id),
            (Method::Post, [verb]) if collection.collection_actions.contains_key(verb) => {
                let handler = collection.collection_actions[verb].clone();
                let (status, out) = handler(&mut collection.items, &body);
                let out = if status == 204 { None } else { Some(out) };
                (ApiResponse::new(status, out), false)
            }
            (Method::Get, [id]) => (
                match find(collection, id) {
                    Some(idx) => ApiResponse::new(200, Some(Value::Object(collection.items[idx].clone()))),
                    None => not_found(),
                },
                false,
            ),
            (Method::Patch, [id]) => (patch(collection, id, &body), false),
            (Method::Delete, [id]) => (
                match find(collection, id) {
                    Some(idx) => {
                        collection.items.remove(idx);
                        ApiResponse::new(204, None)
                    }
                    None => not_found(),
                },
                false,
            ),
            (Method::Post | Method::Patch, [id, verb]) => {
                let handler = collection.item_actions.get(verb).cloned();
                let idx = find(collection, id);
                match (handler, idx) {
                    (Some(handler), Some(idx)) => {
                        let (status, out) = handler(&mut collection.items[idx], &body);
                        let out = if status == 204 { None } else { Some(out) };
                        (ApiResponse::new(status, out), false)
                    }
                    _ => (not_found(), false),
                }
            }
            _ => (
                ApiResponse::new(405, Some(json!({"detail": "Method not allowed."}))),
                false,
            ),
        };

        if consumed_id {
            state.next_id = next_id;
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.handle(&request)
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn id_prefix(path: &str) -> String {
    path.trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("item")
        .trim_end_matches('s')
        .to_string()
}

fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn find(collection: &Collection, id: &str) -> Option<usize> {
    collection
        .items
        .iter()
        .position(|r| record_id(r) == Some(id))
}

fn not_found() -> ApiResponse {
    ApiResponse::new(404, Some(json!({"detail": "Not found."})))
}

fn field_errors(errors: Vec<(String, &str)>) -> ApiResponse {
    let detail: Record = errors
        .into_iter()
        .map(|(field, msg)| (field, json!([msg])))
        .collect();
    ApiResponse::new(400, Some(Value::Object(detail)))
}

fn read_only_violations(rules: &CollectionRules, body: &Record) -> Vec<(String, &'static str)> {
    rules
        .read_only
        .iter()
        .filter(|f| body.contains_key(f.as_str()))
        .map(|f| (f.clone(), "This field is read-only."))
        .collect()
}

fn create(key: &str, collection: &mut Collection, body: &Value, next_id: u64) -> (ApiResponse, bool) {
    let Some(body) = body.as_object() else {
        return (
            ApiResponse::new(400, Some(json!({"non_field_errors": ["Invalid data."]}))),
            false,
        );
    };

    let mut errors = read_only_violations(&collection.rules, body);
    errors.extend(
        collection
            .rules
            .required
            .iter()
            .filter(|f| body.get(f.as_str()).map_or(true, Value::is_null))
            .map(|f| (f.clone(), "This field is required.")),
    );
    if !errors.is_empty() {
        return (field_errors(errors), false);
    }

    let mut record = collection.rules.defaults.clone();
    record.extend(body.clone());
    record.insert(
        "id".to_string(),
        Value::String(format!("{}-{}", id_prefix(key), next_id)),
    );
    collection.items.push(record.clone());
    (ApiResponse::new(201, Some(Value::Object(record))), true)
}

fn patch(collection: &mut Collection, id: &str, body: &Value) -> ApiResponse {
    let Some(idx) = find(collection, id) else {
        return not_found();
    };
    let Some(body) = body.as_object() else {
        return ApiResponse::new(400, Some(json!({"non_field_errors": ["Invalid data."]})));
    };
    let errors = read_only_violations(&collection.rules, body);
    if !errors.is_empty() {
        return field_errors(errors);
    }
    let item = &mut collection.items[idx];
    item.extend(body.clone());
    ApiResponse::new(200, Some(Value::Object(item.clone())))
}

fn list(key: &str, collection: &Collection, query: &[(String, String)]) -> ApiResponse {
    let mut limit = None;
    let mut offset = 0usize;
    let mut ordering = None;
    let mut search = None;
    let mut filters = Vec::new();

    for (k, v) in query {
        match k.as_str() {
            "limit" => limit = v.parse::<usize>().ok(),
            "offset" => offset = v.parse::<usize>().unwrap_or(0),
            "ordering" => ordering = Some(v.as_str()),
            "search" => search = Some(v.to_lowercase()),
            _ => filters.push((k.as_str(), v.as_str())),
        }
    }

    let mut matched: Vec<&Record> = collection
        .items
        .iter()
        .filter(|r| {
            filters
                .iter()
                .all(|(k, v)| r.get(*k).is_some_and(|value| query_repr(value) == *v))
        })
        .filter(|r| match &search {
            Some(term) => r
                .values()
                .any(|v| v.as_str().is_some_and(|s| s.to_lowercase().contains(term))),
            None => true,
        })
        .collect();

    if let Some(ordering) = ordering {
        let (field, descending) = match ordering.strip_prefix('-') {
            Some(field) => (field, true),
            None => (ordering, false),
        };
        matched.sort_by(|a, b| {
            let ord = compare(a.get(field), b.get(field));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let count = matched.len();
    let limit = limit.unwrap_or(count.max(1));
    let page: Vec<Value> = matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|r| Value::Object(r.clone()))
        .collect();

    let next = if offset + limit < count {
        json!(format!("{key}/?limit={limit}&offset={}", offset + limit))
    } else {
        Value::Null
    };
    let previous = if offset > 0 {
        json!(format!("{key}/?limit={limit}&offset={}", offset.saturating_sub(limit)))
    } else {
        Value::Null
    };

    ApiResponse::new(
        200,
        Some(json!({
            "count": count,
            "next": next,
            "previous": previous,
            "results": page,
        })),
    )
}

/// String form used when matching a stored value against a query parameter.
fn query_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Object(obj) => obj
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => query_repr(x).cmp(&query_repr(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
