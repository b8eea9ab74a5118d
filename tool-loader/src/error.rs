//! Loader error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tool_registry::RegistryError;

use crate::blob::BlobError;

/// Result alias for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Coarse classification of a loader failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadFailureKind {
    /// Caller-supplied input was malformed.
    Validation,
    /// The plugin contains denied constructs.
    SecurityViolation,
    /// The archive could not be turned into a working plugin.
    PluginLoad,
}

/// Errors produced while loading or managing plugins.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The plugin name is not a valid tool identifier.
    #[error("invalid plugin name: {0}")]
    InvalidName(#[source] tool_primitives::Error),

    /// The archive exceeded the upload size limit.
    #[error("bad archive: {size} bytes exceeds the {limit} byte limit")]
    ArchiveTooLarge {
        /// Uploaded size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// The archive is not a readable zip file or violates extraction limits.
    #[error("bad archive: {reason}")]
    BadArchive {
        /// Description of the problem.
        reason: String,
    },

    /// A required descriptor file is absent.
    #[error("missing descriptor: {file}")]
    MissingDescriptor {
        /// Descriptor file name.
        file: &'static str,
    },

    /// A descriptor exists but could not be parsed or validated.
    #[error("invalid descriptor {file}: {reason}")]
    InvalidDescriptor {
        /// Descriptor file name.
        file: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// The static scan rejected the plugin.
    #[error("security violation: {reason}")]
    SecurityViolation {
        /// First reason reported by the scanner.
        reason: String,
    },

    /// The name belongs to a tool that was not loaded from an archive.
    #[error("tool `{name}` is not a plugin and cannot be replaced by an upload")]
    NameConflict {
        /// Conflicting name.
        name: String,
    },

    /// No plugin with the name is managed by this loader.
    #[error("plugin `{name}` is not loaded")]
    UnknownPlugin {
        /// Requested name.
        name: String,
    },

    /// Registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Blob storage failed.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Local filesystem operation failed.
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A blocking extraction task was cancelled or panicked.
    #[error("background task failed: {reason}")]
    Task {
        /// Description of the failure.
        reason: String,
    },
}

impl LoaderError {
    pub(crate) fn bad_archive(reason: impl Into<String>) -> Self {
        Self::BadArchive {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classifies the failure.
    #[must_use]
    pub fn kind(&self) -> LoadFailureKind {
        match self {
            Self::InvalidName(_) | Self::NameConflict { .. } | Self::UnknownPlugin { .. } => {
                LoadFailureKind::Validation
            }
            Self::Registry(RegistryError::Validation(_)) => LoadFailureKind::Validation,
            Self::SecurityViolation { .. } => LoadFailureKind::SecurityViolation,
            Self::ArchiveTooLarge { .. }
            | Self::BadArchive { .. }
            | Self::MissingDescriptor { .. }
            | Self::InvalidDescriptor { .. }
            | Self::Registry(_)
            | Self::Blob(_)
            | Self::Io { .. }
            | Self::Task { .. } => LoadFailureKind::PluginLoad,
        }
    }
}
