//! Outbound field values.
//!
//! A [`Payload`] is the set of fields a caller hands to `create`/`update`.
//! An absent key means "not provided"; a present JSON `null` means
//! "explicitly cleared". [`Maybe`] carries the same three states for typed
//! optional arguments so callers never have to overload `Option` for both.

use serde_json::{Map, Value};

/// Three-state optional argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Maybe<T> {
    /// Leave the field out of the payload entirely.
    #[default]
    NotProvided,
    /// Send an explicit `null`.
    Clear,
    Set(T),
}

impl<T> Maybe<T> {
    pub fn is_provided(&self) -> bool {
        !matches!(self, Maybe::NotProvided)
    }

    /// `None` becomes [`Maybe::NotProvided`], never [`Maybe::Clear`].
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Maybe::Set(v),
            None => Maybe::NotProvided,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Maybe<U> {
        match self {
            Maybe::NotProvided => Maybe::NotProvided,
            Maybe::Clear => Maybe::Clear,
            Maybe::Set(v) => Maybe::Set(f(v)),
        }
    }
}

/// Field name to JSON value map used for create/update bodies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Map<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, name: K, value: V) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style explicit clear (`null`).
    pub fn cleared<K: Into<String>>(mut self, name: K) -> Self {
        self.fields.insert(name.into(), Value::Null);
        self
    }

    /// Builder-style insert of a three-state argument.
    pub fn with_maybe<K: Into<String>, V: Into<Value>>(mut self, name: K, value: Maybe<V>) -> Self {
        match value {
            Maybe::NotProvided => {}
            Maybe::Clear => {
                self.fields.insert(name.into(), Value::Null);
            }
            Maybe::Set(v) => {
                self.fields.insert(name.into(), v.into());
            }
        }
        self
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, name: K, value: V) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for Payload {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
