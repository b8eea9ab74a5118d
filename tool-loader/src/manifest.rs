//! Plugin descriptors and the manifest recorded for each accepted archive.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tool_primitives::{
    PluginId, PluginKind, ResourceLimits, ToolCapability, ToolConfiguration, ToolKind,
    ToolMetadata,
};

use crate::error::{LoaderError, LoaderResult};
use crate::scanner::Finding;

/// Descriptor file naming the plugin.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Descriptor file declaring the plugin capabilities.
pub const CAPABILITIES_FILE: &str = "capabilities.json";

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDescriptor {
    /// Name the author gave the plugin.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// How the plugin is executed.
    pub kind: PluginKind,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Declared dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Default settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    /// Environment variables for spawned processes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Resource limits.
    #[serde(default)]
    pub limits: ResourceLimits,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CapabilityDescriptor {
    List(Vec<ToolCapability>),
    Wrapped { capabilities: Vec<ToolCapability> },
}

pub(crate) fn parse_manifest(raw: &[u8]) -> LoaderResult<ManifestDescriptor> {
    serde_json::from_slice(raw).map_err(|err| LoaderError::InvalidDescriptor {
        file: MANIFEST_FILE,
        reason: err.to_string(),
    })
}

pub(crate) fn parse_capabilities(raw: &[u8]) -> LoaderResult<Vec<ToolCapability>> {
    let descriptor: CapabilityDescriptor =
        serde_json::from_slice(raw).map_err(|err| LoaderError::InvalidDescriptor {
            file: CAPABILITIES_FILE,
            reason: err.to_string(),
        })?;
    Ok(match descriptor {
        CapabilityDescriptor::List(capabilities)
        | CapabilityDescriptor::Wrapped { capabilities } => capabilities,
    })
}

/// Settings supplied at upload time on top of the descriptor defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOverrides {
    /// Settings merged over the descriptor's `config`.
    pub settings: BTreeMap<String, Value>,
    /// Environment variables merged over the descriptor's `env`.
    pub env: BTreeMap<String, String>,
    /// Replacement resource limits.
    pub limits: Option<ResourceLimits>,
    /// Users allowed to call the plugin.
    pub allowed_users: Vec<String>,
    /// Register the plugin disabled.
    pub disabled: bool,
}

/// Outcome of the static scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityVerdict {
    passed: bool,
    reasons: Vec<String>,
    scanned_files: usize,
}

impl SecurityVerdict {
    pub(crate) fn from_findings(findings: &[Finding], scanned_files: usize) -> Self {
        Self {
            passed: findings.is_empty(),
            reasons: findings.iter().map(ToString::to_string).collect(),
            scanned_files,
        }
    }

    /// Returns `true` when no finding was reported.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Returns every finding as a message.
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Returns the first finding, reported to uploaders.
    #[must_use]
    pub fn first_reason(&self) -> Option<&str> {
        self.reasons.first().map(String::as_str)
    }

    /// Returns the number of source files scanned.
    #[must_use]
    pub const fn scanned_files(&self) -> usize {
        self.scanned_files
    }
}

/// Everything the loader knows about an accepted plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginManifest {
    id: PluginId,
    descriptor: ManifestDescriptor,
    metadata: ToolMetadata,
    config: ToolConfiguration,
    verdict: SecurityVerdict,
    archive_key: String,
    loaded_at: DateTime<Utc>,
}

impl PluginManifest {
    pub(crate) fn new(
        id: PluginId,
        descriptor: ManifestDescriptor,
        metadata: ToolMetadata,
        config: ToolConfiguration,
        verdict: SecurityVerdict,
        archive_key: String,
    ) -> Self {
        Self {
            id,
            descriptor,
            metadata,
            config,
            verdict,
            archive_key,
            loaded_at: Utc::now(),
        }
    }

    pub(crate) fn reloaded(&self, descriptor: ManifestDescriptor, verdict: SecurityVerdict) -> Self {
        Self {
            descriptor,
            verdict,
            loaded_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns the identifier handed to the uploader.
    #[must_use]
    pub const fn id(&self) -> PluginId {
        self.id
    }

    /// Returns the registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the parsed `manifest.json`.
    #[must_use]
    pub fn descriptor(&self) -> &ManifestDescriptor {
        &self.descriptor
    }

    /// Returns the metadata registered for the plugin.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns the configuration blueprint the plugin was registered with.
    #[must_use]
    pub fn config(&self) -> &ToolConfiguration {
        &self.config
    }

    /// Returns the scan verdict.
    #[must_use]
    pub fn verdict(&self) -> &SecurityVerdict {
        &self.verdict
    }

    /// Returns the blob key of the stored archive.
    #[must_use]
    pub fn archive_key(&self) -> &str {
        &self.archive_key
    }

    /// Returns when the archive was last accepted.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Builds the registry metadata for a plugin registered under `name`.
pub(crate) fn build_metadata(
    name: &str,
    descriptor: &ManifestDescriptor,
    capabilities: Vec<ToolCapability>,
) -> LoaderResult<ToolMetadata> {
    let invalid = |err: tool_primitives::Error| LoaderError::InvalidDescriptor {
        file: MANIFEST_FILE,
        reason: err.to_string(),
    };

    let mut builder = ToolMetadata::builder(name, ToolKind::Plugin(descriptor.kind))
        .version(descriptor.version.clone())
        .map_err(invalid)?
        .capabilities(capabilities);
    if let Some(description) = &descriptor.description {
        builder = builder.description(description.clone());
    }
    if let Some(author) = &descriptor.author {
        builder = builder.author(author.clone());
    }
    for tag in &descriptor.tags {
        builder = builder.tag(tag.clone()).map_err(invalid)?;
    }
    for dependency in &descriptor.dependencies {
        builder = builder.dependency(dependency.clone());
    }
    builder.build().map_err(|err| match err {
        tool_primitives::Error::InvalidSchema { .. } => LoaderError::InvalidDescriptor {
            file: CAPABILITIES_FILE,
            reason: err.to_string(),
        },
        other => invalid(other),
    })
}

/// Merges descriptor defaults and upload overrides into a configuration.
pub(crate) fn build_config(
    descriptor: &ManifestDescriptor,
    overrides: &PluginOverrides,
) -> ToolConfiguration {
    let mut config = ToolConfiguration::new()
        .with_limits(
            overrides
                .limits
                .clone()
                .unwrap_or_else(|| descriptor.limits.clone()),
        )
        .with_allowed_users(overrides.allowed_users.iter().cloned())
        .with_enabled(!overrides.disabled);
    for (key, value) in descriptor.config.iter().chain(&overrides.settings) {
        config.insert_setting(key.clone(), value.clone());
    }
    for (key, value) in descriptor.env.iter().chain(&overrides.env) {
        config = config.with_env(key.clone(), value.clone());
    }
    config
}
