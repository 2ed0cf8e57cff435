//! Core types, errors, and schema metadata for airsdk.
//!
//! This crate provides the foundational types used throughout the airsdk
//! workspace:
//!
//! - **Error types**: the runtime's error taxonomy, [`AirError`] and [`Result`]
//! - **Field descriptors**: static per-model schemas ([`ModelSchema`],
//!   [`FieldDescriptor`]) consumed by the endpoint runtime
//! - **Payload values**: [`Payload`] and the three-state [`Maybe`]
//!
//! # Overview
//!
//! airsdk-core holds no I/O. Transports, configuration and the
//! synchronization runtime live in their own crates and depend on this one.
//!
//! # Examples
//!
//! ## Building a payload
//!
//! ```rust
//! use airsdk_core::{Maybe, Payload};
//!
//! let payload = Payload::new()
//!     .with("name", "lab")
//!     .with_maybe("sleep_at", Maybe::<String>::Clear);
//!
//! assert_eq!(payload.len(), 2);
//! ```
//!
//! ## Error handling
//!
//! ```rust
//! use airsdk_core::{AirError, Result};
//!
//! fn lookup() -> Result<String> {
//!     Err(AirError::not_found("Simulation", "sim-1"))
//! }
//!
//! match lookup() {
//!     Ok(val) => println!("found {}", val),
//!     Err(e) if e.is_not_found() => println!("missing: {}", e),
//!     Err(e) => println!("error: {}", e),
//! }
//! ```

pub mod error;
pub mod field;
pub mod method;
pub mod value;

pub use error::{AirError, Result};
pub use field::{
    FieldDescriptor, FieldKind, FlushMode, ModelSchema, Operation, Operations, VerbDescriptor,
    VerbScope, WritePolicy,
};
pub use method::Method;
pub use value::{Maybe, Payload};

/// Prelude module for convenient imports.
///
/// ```rust
/// use airsdk_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{AirError, Result};
    pub use crate::field::{FieldDescriptor, FlushMode, ModelSchema, Operations};
    pub use crate::value::{Maybe, Payload};
}
