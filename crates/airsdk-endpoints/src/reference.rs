//! Caller-side references to other resources.

use serde_json::Value;

use airsdk_core::{AirError, Result};

use crate::model::Model;

/// Either a bare primary key or a live model instance.
///
/// Every API that accepts "another resource" takes `impl Into<Reference>`
/// and reduces it to a key with [`Reference::key`] before anything is sent.
#[derive(Debug, Clone)]
pub enum Reference {
    Id(String),
    Instance(Model),
}

impl Reference {
    /// The canonical identifier.
    ///
    /// Fails with `Unsaved` for an instance that was never created and with
    /// `StaleReference` for one whose resource was deleted.
    pub fn key(&self) -> Result<String> {
        match self {
            Reference::Id(id) => {
                if id.trim().is_empty() {
                    return Err(AirError::invalid_argument("reference id must not be empty"));
                }
                Ok(id.clone())
            }
            Reference::Instance(model) => {
                model.ensure_live()?;
                model.key().ok_or_else(|| AirError::Unsaved {
                    model: model.schema().name.to_string(),
                })
            }
        }
    }

    pub fn instance(&self) -> Option<&Model> {
        match self {
            Reference::Instance(model) => Some(model),
            Reference::Id(_) => None,
        }
    }

    /// Wire form: the identifier as a JSON string.
    pub fn to_value(&self) -> Result<Value> {
        self.key().map(Value::String)
    }
}

impl From<&str> for Reference {
    fn from(id: &str) -> Self {
        Reference::Id(id.to_string())
    }
}

impl From<String> for Reference {
    fn from(id: String) -> Self {
        Reference::Id(id)
    }
}

impl From<&String> for Reference {
    fn from(id: &String) -> Self {
        Reference::Id(id.clone())
    }
}

impl From<Model> for Reference {
    fn from(model: Model) -> Self {
        Reference::Instance(model)
    }
}

impl From<&Model> for Reference {
    fn from(model: &Model) -> Self {
        Reference::Instance(model.clone())
    }
}

/// Extract an identifier from a reference-shaped JSON value.
///
/// Accepts a string id, an embedded object carrying the primary key, or a
/// number. Anything else is rejected.
pub(crate) fn id_from_value(value: &Value, primary_key: &str) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get(primary_key).and_then(|v| id_from_value(v, primary_key)),
        _ => None,
    }
}
