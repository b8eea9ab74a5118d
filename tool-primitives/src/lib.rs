//! Core shared types for the tool runtime.
//!
//! Every other crate in the workspace speaks in terms of the vocabulary defined
//! here: tools, the capabilities they expose, the schemas describing their
//! inputs and outputs, and the per-tool runtime configuration.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod config;
mod error;
mod ids;
mod metadata;
mod schema;

/// Capability descriptors and supporting builders.
pub use capability::{CapabilityExample, ToolCapability, ToolCapabilityBuilder};
/// Runtime configuration attached to each registered tool.
pub use config::{ResourceLimits, ToolConfiguration, settings};
/// Error type and result alias shared across the runtime.
pub use error::{Error, Result};
/// Unique identifiers handed out by the registry and loader.
pub use ids::{PluginId, ToolId, validate_identifier};
/// Tool metadata and kind taxonomy.
pub use metadata::{PluginKind, ToolKind, ToolMetadata, ToolMetadataBuilder};
/// Parameter schema primitives.
pub use schema::{ParamType, ParameterSpec, object_schema};
