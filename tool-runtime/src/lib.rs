//! Tool runtime for AI agents.
//!
//! [`ToolRuntime`] wires the workspace crates together: uploaded plugins are
//! validated by the loader and registered, requests are routed to tools,
//! executed under permission, concurrency, deadline, and circuit-breaker
//! control, and the callable capability set is projected into the formats
//! language models consume. The component crates are re-exported for
//! callers that need more than the facade.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod lifecycle;
mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult, RuntimeState};
pub use runtime::{ToolRuntime, ToolRuntimeBuilder};

/// Model adapter contract and shared HTTP client.
pub use tool_adapters as adapters;
/// Runtime configuration files.
pub use tool_config as config;
/// Execution service, backends, and journal.
pub use tool_executor as executor;
/// Plugin archive intake.
pub use tool_loader as loader;
/// Capability model.
pub use tool_primitives as primitives;
/// Prompt projection and the JSON-RPC tool protocol.
pub use tool_projector as projector;
/// Tool registry and circuit breaker.
pub use tool_registry as registry;
/// Request routing.
pub use tool_router as router;
/// Tracing setup.
pub use tool_telemetry as telemetry;
