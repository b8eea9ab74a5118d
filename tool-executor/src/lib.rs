//! Execution service for the tool runtime.
//!
//! [`ExecutionService`] takes an [`ExecutionRequest`], checks it against the
//! registry (existence, enabled flag, capability, caller permissions), applies
//! the tool's concurrency limit and circuit breaker, then dispatches to the
//! tool's [`PluginBackend`] under a deadline. Every attempt is reported back to
//! the registry and, when configured, appended to an [`ExecutionJournal`].

#![warn(missing_docs, clippy::pedantic)]

mod backend;
mod error;
mod http;
mod journal;
mod limiter;
mod process;
mod provider;
mod service;
mod types;

pub use backend::{HttpSpec, PluginBackend, ProcessSpec};
pub use error::{DispatchError, JournalError, JournalResult, ProviderError, ProviderResult};
pub use journal::{ExecutionJournal, FileJournal, JournalEntry, MemoryJournal};
pub use process::{MAX_MEMORY_ENV, MAX_SECONDS_ENV};
pub use provider::{
    CapabilityProvider, Invocation, ProviderFactory, ProviderRegistration, ProviderRegistry,
};
pub use service::{ExecutionConfig, ExecutionService, ToolExecutor};
pub use types::{
    CallerIdentity, ErrorKind, ExecutionError, ExecutionRequest, ExecutionResult, ValueMap,
};

/// Re-exported so plugins can submit [`ProviderRegistration`]s without a
/// direct dependency.
pub use inventory;
