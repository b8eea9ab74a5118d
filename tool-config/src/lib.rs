//! Runtime configuration for the tool runtime.
//!
//! [`RuntimeConfig`] is read from a TOML file. Every section is optional and
//! falls back to its defaults; a missing file means an all-default
//! configuration.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use schema::{
    BreakerSection, ExecutionSection, LogFormat, LoaderSection, LoggingSection, RoutingSection,
    RoutingStrategy, RuntimeConfig, ToolEntry,
};
