//! Model and endpoint synchronization runtime for airsdk.
//!
//! This crate maps typed access on remote resources onto requests issued
//! through an [`airsdk_transport::Transport`]:
//!
//! - **Sessions**: [`AirApi`] owns the transport, the [`ClientOptions`] and
//!   the identity cache shared by everything created from it
//! - **Endpoints**: [`EndpointClient`] is the CRUD surface of one resource type,
//!   driven entirely by its static [`ModelSchema`]
//! - **Instances**: [`Model`] stages edits in a dirty set and sends only those
//!   fields on [`Model::save`]; references resolve lazily and are memoized
//! - **Listing**: [`Cursor`] walks `limit`/`offset` pages one request per page
//! - **Bulk**: [`EndpointClient::bulk_update`], [`EndpointClient::bulk_delete`]
//!   and [`save_all`] report per-item outcomes in a [`BulkReport`]
//! - **Legacy names**: [`LegacyModel`], [`LegacyEndpoint`] and [`LegacyApi`]
//!   translate the previous generation of field and verb names
//!
//! # Examples
//!
//! ```rust,ignore
//! use airsdk_endpoints::{AirApi, Payload};
//!
//! let api = AirApi::from_config(&config)?;
//! let mut sim = api.simulations().get("sim-1").await?;
//! sim.set("name", "lab-2").await?;
//! sim.save().await?;
//!
//! let mut nodes = sim.related("Node", "simulation")?.iter()?;
//! while let Some(node) = nodes.try_next().await? {
//!     println!("{}", node.get_str("name")?);
//! }
//! ```

pub mod api;
pub mod bulk;
pub mod compat;
pub mod endpoint;
pub mod model;
pub mod pagination;
pub mod reference;
pub mod resources;

mod identity;
mod response;

pub use api::{AirApi, AirApiBuilder, ClientOptions, SchemaRegistryError};
pub use bulk::{save_all, BulkReport};
pub use compat::{AliasTable, LegacyApi, LegacyEndpoint, LegacyModel, LegacyOutcome};
pub use endpoint::EndpointClient;
pub use model::Model;
pub use pagination::Cursor;
pub use reference::Reference;

pub use airsdk_core::{AirError, FlushMode, Maybe, ModelSchema, Payload, Result};
