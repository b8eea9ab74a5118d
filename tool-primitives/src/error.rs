//! Shared error definitions for tool primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the tool runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or validating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed.
    #[error("invalid id: {source}")]
    InvalidId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Tool or capability name failed validation.
    #[error("invalid identifier `{id}`: {reason}")]
    InvalidIdentifier {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A capability schema was malformed.
    #[error("invalid schema for capability `{capability}`: {reason}")]
    InvalidSchema {
        /// Capability whose schema was rejected.
        capability: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    /// Convenience constructor for schema failures.
    #[must_use]
    pub fn schema(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for metadata failures.
    #[must_use]
    pub fn metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }
}
