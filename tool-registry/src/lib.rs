//! Source of truth for registered tools.
//!
//! The registry owns tool metadata, mutable per-tool configuration, and the
//! health record driving each tool's circuit breaker. Other components only
//! read from it; health transitions go through [`ToolRegistry::admit`] and
//! [`ToolRegistry::report_outcome`].

#![warn(missing_docs, clippy::pedantic)]

mod health;
mod registry;

pub use health::{Admission, BreakerConfig, CircuitState, HealthRecord};
pub use registry::{
    RegistryError, RegistryResult, ToolFilter, ToolLease, ToolRecord, ToolRegistry,
};
