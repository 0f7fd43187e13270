//! Spec ingestion for the Skyline MCP gateway.
//!
//! The pipeline is detect → fetch → adapter dispatch → canonicalise →
//! filter: heterogeneous API descriptions come in, canonical
//! [`model::Service`]s with uniformly described operations come out.

pub mod adapters;
pub mod error;
pub mod graphql;
pub mod loader;
pub mod model;
pub mod sanitize;
pub mod well_known;

pub use adapters::SpecType;
pub use error::SpecError;
pub use loader::{SpecLoader, SpecSource, apply_operation_filters, resolve_spec_url};
pub use model::{Operation, Parameter, ParameterLocation, Service};
