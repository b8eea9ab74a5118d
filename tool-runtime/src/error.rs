use thiserror::Error;
use tool_config::ConfigError;
use tool_executor::{ErrorKind, JournalError};
use tool_loader::{LoadFailureKind, LoaderError};
use tool_registry::RegistryError;
use tool_router::RoutingError;

use crate::lifecycle::{LifecycleError, RuntimeState};

/// Errors surfaced by [`crate::ToolRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Runtime configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A plugin operation failed.
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// The routing table could not be loaded.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// The execution journal could not be opened.
    #[error(transparent)]
    Journal(#[from] JournalError),
    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The operation needs a running runtime.
    #[error("runtime is not running (state: {0:?})")]
    NotRunning(RuntimeState),
    /// Delegated routing was configured without a model adapter.
    #[error("delegated routing requires a model adapter")]
    MissingAdapter,
}

impl RuntimeError {
    /// Maps the failure onto the shared error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Loader(err) => match err.kind() {
                LoadFailureKind::Validation => ErrorKind::Validation,
                LoadFailureKind::SecurityViolation => ErrorKind::SecurityViolation,
                LoadFailureKind::PluginLoad => ErrorKind::PluginLoad,
            },
            Self::Registry(RegistryError::UnknownTool { .. }) => ErrorKind::UnknownTool,
            Self::Registry(_)
            | Self::Config(_)
            | Self::Routing(_)
            | Self::Lifecycle(_)
            | Self::MissingAdapter => ErrorKind::Validation,
            Self::Journal(_) => ErrorKind::ExecutionFailure,
            Self::NotRunning(_) => ErrorKind::ToolUnavailable,
        }
    }
}

/// Result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
