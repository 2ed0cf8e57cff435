//! Session-scoped identity cache.
//!
//! Every handle to the same `(model, primary key)` shares one [`Record`].
//! Whenever any call returns data for that key, the record is replaced in
//! place, so all handles observe the newest server state. The map holds weak
//! references only; a record lives as long as some handle points at it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

#[derive(Debug, Default)]
struct RecordState {
    fields: Map<String, Value>,
    deleted: bool,
}

/// Server-side state of one resource as last seen by this session.
#[derive(Debug)]
pub(crate) struct Record {
    model: &'static str,
    key: Option<String>,
    state: RwLock<RecordState>,
}

impl Record {
    fn new(model: &'static str, key: Option<String>, fields: Map<String, Value>) -> Self {
        Self {
            model,
            key,
            state: RwLock::new(RecordState {
                fields,
                deleted: false,
            }),
        }
    }

    /// A record for an instance that has not been created yet.
    pub(crate) fn detached(model: &'static str) -> Arc<Self> {
        Arc::new(Self::new(model, None, Map::new()))
    }

    pub(crate) fn model(&self) -> &'static str {
        self.model
    }

    pub(crate) fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub(crate) fn get(&self, field: &str) -> Option<Value> {
        self.state.read().fields.get(field).cloned()
    }

    pub(crate) fn contains(&self, field: &str) -> bool {
        self.state.read().fields.contains_key(field)
    }

    pub(crate) fn fields(&self) -> Map<String, Value> {
        self.state.read().fields.clone()
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.state.read().deleted
    }

    fn replace(&self, fields: Map<String, Value>) {
        let mut state = self.state.write();
        state.fields = fields;
    }

    fn mark_deleted(&self) {
        self.state.write().deleted = true;
    }
}

/// Weak map from `(model, key)` to the shared record.
pub(crate) struct IdentityMap {
    entries: Mutex<HashMap<(&'static str, String), Weak<Record>>>,
    prune_at: Mutex<usize>,
}

const MIN_PRUNE_THRESHOLD: usize = 256;

impl Default for IdentityMap {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            prune_at: Mutex::new(MIN_PRUNE_THRESHOLD),
        }
    }
}

impl IdentityMap {
    /// Install `fields` as the current state of `(model, key)` and return
    /// the shared record. Existing handles see the new values immediately.
    pub(crate) fn upsert(
        &self,
        model: &'static str,
        key: &str,
        fields: Map<String, Value>,
    ) -> Arc<Record> {
        let mut entries = self.entries.lock();
        let map_key = (model, key.to_string());

        if let Some(existing) = entries.get(&map_key).and_then(Weak::upgrade) {
            existing.replace(fields);
            return existing;
        }

        {
            let mut prune_at = self.prune_at.lock();
            if entries.len() >= *prune_at {
                entries.retain(|_, weak| weak.strong_count() > 0);
                *prune_at = (entries.len() * 2).max(MIN_PRUNE_THRESHOLD);
            }
        }

        let record = Arc::new(Record::new(model, Some(key.to_string()), fields));
        entries.insert(map_key, Arc::downgrade(&record));
        record
    }

    pub(crate) fn lookup(&self, model: &'static str, key: &str) -> Option<Arc<Record>> {
        self.entries
            .lock()
            .get(&(model, key.to_string()))
            .and_then(Weak::upgrade)
    }

    /// Flag every live handle of `(model, key)` as stale and forget the key.
    pub(crate) fn mark_deleted(&self, model: &'static str, key: &str) {
        let removed = self.entries.lock().remove(&(model, key.to_string()));
        if let Some(record) = removed.and_then(|weak| weak.upgrade()) {
            record.mark_deleted();
        }
    }

    /// Mark a specific record stale even if the map no longer tracks it.
    pub(crate) fn mark_record_deleted(&self, record: &Record) {
        if let Some(key) = record.key() {
            self.mark_deleted(record.model(), key);
        }
        record.mark_deleted();
    }

    /// Number of keys with at least one live handle.
    pub(crate) fn live_len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
