//! Error types for the execution subsystem.

use thiserror::Error;

/// Result alias for capability providers.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by in-process capability providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider does not implement the capability.
    #[error("capability `{capability}` is not supported by this provider")]
    Unsupported {
        /// Requested capability.
        capability: String,
    },
    /// The input was rejected by the provider.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Human-readable reason.
        reason: String,
    },
    /// The capability failed.
    #[error("{reason}")]
    Failed {
        /// Human-readable reason.
        reason: String,
    },
    /// No factory is registered under the key.
    #[error("no provider factory registered under `{key}`")]
    UnknownFactory {
        /// Missing factory key.
        key: String,
    },
    /// A factory of that key already exists.
    #[error("provider factory `{key}` is already registered")]
    DuplicateFactory {
        /// Conflicting key.
        key: String,
    },
}

impl ProviderError {
    /// Creates a [`ProviderError::Failed`].
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Creates a [`ProviderError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates a [`ProviderError::Unsupported`].
    #[must_use]
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }
}

/// Failures inside a backend dispatch. All map to an execution failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The tool's configuration does not describe a usable backend.
    #[error("misconfigured tool: {0}")]
    Misconfigured(String),
    /// An in-process provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The child process could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Pipe I/O with the child failed.
    #[error("process i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The child exited unsuccessfully.
    #[error("process exited with {status}: {stderr}")]
    Exit {
        /// Exit status description.
        status: String,
        /// Tail of standard error.
        stderr: String,
    },
    /// The backend produced more output than allowed.
    #[error("output exceeded {limit} bytes")]
    OutputTooLarge {
        /// Configured ceiling.
        limit: usize,
    },
    /// The backend's response could not be interpreted.
    #[error("unusable response: {0}")]
    Protocol(String),
    /// The HTTP request failed before a response arrived.
    #[error("http transport error: {0}")]
    Transport(String),
    /// The HTTP endpoint answered with a non-success status.
    #[error("http status {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Leading part of the body.
        body: String,
    },
    /// The backend reported `success: false`.
    #[error("{0}")]
    Remote(String),
}

/// Result alias for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors emitted by execution journals.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying I/O failure.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
}
