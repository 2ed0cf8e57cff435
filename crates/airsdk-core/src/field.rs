//! Field Descriptor Set.
//!
//! Every model type is described by one `static` [`ModelSchema`]: its endpoint
//! path, primary key, declared fields, accepted filters, supported operations
//! and business verbs. Descriptors are immutable and shared by every instance
//! of the model.
//!
//! ```rust
//! use airsdk_core::field::{FieldDescriptor, FlushMode, ModelSchema, Operations};
//!
//! static WIDGET: ModelSchema = ModelSchema {
//!     name: "Widget",
//!     path: "widgets",
//!     primary_key: "id",
//!     fields: &[
//!         FieldDescriptor::scalar("id").server_assigned(),
//!         FieldDescriptor::scalar("name").filterable(),
//!         FieldDescriptor::reference("owner", "User").nullable(),
//!     ],
//!     extra_filters: &[],
//!     operations: Operations::ALL,
//!     verbs: &[],
//!     flush: FlushMode::Explicit,
//! };
//!
//! assert!(WIDGET.field("owner").unwrap().is_reference());
//! assert_eq!(WIDGET.item_path("w-1"), "widgets/w-1/");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AirError, Result};
use crate::method::Method;

/// Filters every list endpoint accepts in addition to the schema's own.
pub const GENERIC_FILTERS: &[&str] = &["ordering", "search"];

/// Shape of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain JSON value (string, number, bool, nested object or array).
    Scalar,
    /// Single relationship to another model, stored as its primary key.
    Reference { target: &'static str },
    /// List of relationships to another model.
    ReferenceList { target: &'static str },
}

/// How a field participates in outbound create/update payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Caller-writable.
    ReadWrite,
    /// Owned by the server. Supplying it on create is rejected before any
    /// request is sent; on update it is accepted only when it matches the
    /// value already known locally, and then dropped from the payload.
    ServerAssigned,
    /// The caller may pass it, but the server is authoritative: it is
    /// stripped from outbound payloads without error.
    ClientHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub policy: WritePolicy,
    pub filterable: bool,
    /// Omitted from list representations; loaded by a follow-up fetch.
    pub lazy: bool,
}

impl FieldDescriptor {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            policy: WritePolicy::ReadWrite,
            filterable: false,
            lazy: false,
        }
    }

    pub const fn scalar(name: &'static str) -> Self {
        Self::new(name, FieldKind::Scalar)
    }

    pub const fn reference(name: &'static str, target: &'static str) -> Self {
        Self::new(name, FieldKind::Reference { target })
    }

    pub const fn reference_list(name: &'static str, target: &'static str) -> Self {
        Self::new(name, FieldKind::ReferenceList { target })
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub const fn server_assigned(self) -> Self {
        Self {
            policy: WritePolicy::ServerAssigned,
            ..self
        }
    }

    pub const fn client_hint(self) -> Self {
        Self {
            policy: WritePolicy::ClientHint,
            ..self
        }
    }

    pub const fn filterable(self) -> Self {
        Self {
            filterable: true,
            ..self
        }
    }

    pub const fn lazy(self) -> Self {
        Self { lazy: true, ..self }
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self.kind, FieldKind::Scalar)
    }

    /// Target model name for relationship fields.
    pub fn target(&self) -> Option<&'static str> {
        match self.kind {
            FieldKind::Scalar => None,
            FieldKind::Reference { target } | FieldKind::ReferenceList { target } => Some(target),
        }
    }

    pub fn is_server_assigned(&self) -> bool {
        self.policy == WritePolicy::ServerAssigned
    }
}

/// When staged field changes reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Changes accumulate until `save()`.
    #[default]
    Explicit,
    /// Every `set()` issues its own PATCH before returning.
    Immediate,
}

impl std::str::FromStr for FlushMode {
    type Err = AirError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(FlushMode::Explicit),
            "immediate" => Ok(FlushMode::Immediate),
            other => Err(AirError::invalid_argument(format!(
                "unknown flush mode '{other}' (expected 'explicit' or 'immediate')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Patch,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
        }
    }
}

/// CRUD operations an endpoint exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operations {
    pub list: bool,
    pub get: bool,
    pub create: bool,
    pub patch: bool,
    pub delete: bool,
}

impl Operations {
    pub const ALL: Operations = Operations {
        list: true,
        get: true,
        create: true,
        patch: true,
        delete: true,
    };

    pub const READ_ONLY: Operations = Operations {
        list: true,
        get: true,
        create: false,
        patch: false,
        delete: false,
    };

    /// Created and deleted, never modified in place.
    pub const IMMUTABLE: Operations = Operations {
        list: true,
        get: true,
        create: true,
        patch: false,
        delete: true,
    };

    pub fn allows(&self, op: Operation) -> bool {
        match op {
            Operation::List => self.list,
            Operation::Get => self.get,
            Operation::Create => self.create,
            Operation::Patch => self.patch,
            Operation::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbScope {
    /// `{base}/{pk}/{path}/`
    Instance,
    /// `{base}/{path}/`
    Collection,
}

/// A business verb the runtime dispatches without interpreting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbDescriptor {
    pub name: &'static str,
    pub path: &'static str,
    pub method: Method,
    pub scope: VerbScope,
}

impl VerbDescriptor {
    pub const fn instance(name: &'static str, path: &'static str, method: Method) -> Self {
        Self {
            name,
            path,
            method,
            scope: VerbScope::Instance,
        }
    }

    pub const fn collection(name: &'static str, path: &'static str, method: Method) -> Self {
        Self {
            name,
            path,
            method,
            scope: VerbScope::Collection,
        }
    }
}

/// Static description of one model type and its endpoint.
#[derive(Debug)]
pub struct ModelSchema {
    pub name: &'static str,
    pub path: &'static str,
    pub primary_key: &'static str,
    pub fields: &'static [FieldDescriptor],
    /// Filters accepted by `list` that are not declared fields.
    pub extra_filters: &'static [&'static str],
    pub operations: Operations,
    pub verbs: &'static [VerbDescriptor],
    /// Default flush mode; configuration may override it per model.
    pub flush: FlushMode,
}

impl ModelSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field, failing with [`AirError::UnknownField`].
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name)
            .ok_or_else(|| AirError::unknown_field(self.name, name))
    }

    pub fn accepts_filter(&self, name: &str) -> bool {
        GENERIC_FILTERS.contains(&name)
            || self.extra_filters.contains(&name)
            || self.field(name).is_some_and(|f| f.filterable)
    }

    pub fn verb(&self, name: &str) -> Option<&VerbDescriptor> {
        self.verbs.iter().find(|v| v.name == name)
    }

    /// Fail with [`AirError::UnsupportedOperation`] unless `op` is exposed.
    pub fn ensure(&self, op: Operation) -> Result<()> {
        if self.operations.allows(op) {
            Ok(())
        } else {
            Err(AirError::unsupported_operation(self.name, op.as_str()))
        }
    }

    pub fn collection_path(&self) -> String {
        format!("{}/", self.path.trim_matches('/'))
    }

    pub fn item_path(&self, key: &str) -> String {
        format!("{}/{}/", self.path.trim_matches('/'), key)
    }

    pub fn verb_path(&self, verb: &VerbDescriptor, key: Option<&str>) -> Result<String> {
        let base = self.path.trim_matches('/');
        let tail = verb.path.trim_matches('/');
        match (verb.scope, key) {
            (VerbScope::Collection, _) => Ok(format!("{base}/{tail}/")),
            (VerbScope::Instance, Some(key)) => Ok(format!("{base}/{key}/{tail}/")),
            (VerbScope::Instance, None) => Err(AirError::Unsaved {
                model: self.name.to_string(),
            }),
        }
    }
}
