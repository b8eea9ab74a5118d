//! Plugin archive intake for the tool runtime.
//!
//! Uploaded archives are extracted into a scoped scratch directory, their
//! descriptors parsed, and every Python source statically scanned before the
//! archive is persisted to the [`BlobStore`], installed under the plugins
//! directory, and registered with the [`tool_registry::ToolRegistry`]. A
//! failure at any step leaves no registry entry and no installed files.

#![warn(missing_docs, clippy::pedantic)]

mod archive;
mod blob;
mod error;
mod loader;
mod manifest;
mod scanner;

pub use archive::ArchiveLimits;
pub use blob::{BlobError, BlobResult, BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{LoadFailureKind, LoaderError, LoaderResult};
pub use loader::{LoaderConfig, PluginLoader};
pub use manifest::{
    CAPABILITIES_FILE, MANIFEST_FILE, ManifestDescriptor, PluginManifest, PluginOverrides,
    SecurityVerdict,
};
pub use scanner::{DENIED_CALLS, DENIED_IMPORTS, Finding, Problem, scan_source};
