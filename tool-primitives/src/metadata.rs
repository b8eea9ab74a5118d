//! Tool metadata advertised to the registry.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::ToolCapability;
use crate::error::{Error, Result};
use crate::validate_identifier;

/// How a plugin tool is backed at execution time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// In-process provider resolved through the provider factory registry.
    NativeModule,
    /// Child process speaking JSON over stdio.
    Executable,
    /// Remote HTTP endpoint.
    HttpApi,
}

/// Where a tool comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Compiled into the runtime.
    Internal,
    /// Served by an external tool server.
    RemoteServer,
    /// Loaded from an uploaded plugin archive.
    Plugin(PluginKind),
}

impl ToolKind {
    /// Returns `true` for tools loaded from plugin archives.
    #[must_use]
    pub const fn is_plugin(self) -> bool {
        matches!(self, Self::Plugin(_))
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::RemoteServer => f.write_str("remote_server"),
            Self::Plugin(PluginKind::NativeModule) => f.write_str("plugin:native_module"),
            Self::Plugin(PluginKind::Executable) => f.write_str("plugin:executable"),
            Self::Plugin(PluginKind::HttpApi) => f.write_str("plugin:http_api"),
        }
    }
}

/// Describes a tool and the capabilities it exposes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    name: String,
    version: String,
    kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    capabilities: Vec<ToolCapability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
}

impl ToolMetadata {
    /// Starts building metadata for the named tool.
    #[must_use]
    pub fn builder(name: impl Into<String>, kind: ToolKind) -> ToolMetadataBuilder {
        ToolMetadataBuilder {
            name: name.into(),
            kind,
            version: None,
            description: None,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            tags: Vec::new(),
            author: None,
        }
    }

    /// Returns the unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the tool kind.
    #[must_use]
    pub const fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the exposed capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[ToolCapability] {
        &self.capabilities
    }

    /// Looks up a capability by name.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<&ToolCapability> {
        self.capabilities.iter().find(|cap| cap.name() == name)
    }

    /// Returns declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns free-form tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the optional author.
    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Returns a copy of this metadata under a different tool name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] when the new name is malformed.
    pub fn renamed(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        self.name = name;
        Ok(self)
    }

    /// Validates the metadata and every capability schema.
    ///
    /// Metadata assembled through the builder is already valid; this is the
    /// entry point for metadata deserialised from descriptors.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure encountered.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        if self.version.trim().is_empty() {
            return Err(Error::metadata("tool version cannot be empty"));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(Error::metadata("tool tag cannot be empty"));
        }

        let mut names = HashSet::new();
        for capability in &self.capabilities {
            capability.validate()?;
            if !names.insert(capability.name()) {
                return Err(Error::metadata(format!(
                    "duplicate capability `{}`",
                    capability.name()
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`ToolMetadata`].
#[derive(Debug)]
pub struct ToolMetadataBuilder {
    name: String,
    kind: ToolKind,
    version: Option<String>,
    description: Option<String>,
    capabilities: Vec<ToolCapability>,
    dependencies: Vec<String>,
    tags: Vec<String>,
    author: Option<String>,
}

impl ToolMetadataBuilder {
    /// Sets the version string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] when the version string is empty.
    pub fn version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(Error::metadata("tool version cannot be empty"));
        }
        self.version = Some(version);
        Ok(self)
    }

    /// Sets an optional description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a capability.
    #[must_use]
    pub fn capability(mut self, capability: ToolCapability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Replaces the capability set.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Vec<ToolCapability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Adds a declared dependency.
    #[must_use]
    pub fn dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds a tag label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] when the supplied tag is empty.
    pub fn tag(mut self, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(Error::metadata("tool tag cannot be empty"));
        }
        self.tags.push(tag);
        Ok(self)
    }

    /// Sets the author.
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Consumes the builder and returns validated metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMetadata`] if the version is missing, or any
    /// failure reported by [`ToolMetadata::validate`].
    pub fn build(self) -> Result<ToolMetadata> {
        let version = self
            .version
            .ok_or_else(|| Error::metadata("tool version must be provided"))?;

        let metadata = ToolMetadata {
            name: self.name,
            version,
            kind: self.kind,
            description: self.description,
            capabilities: self.capabilities,
            dependencies: self.dependencies,
            tags: self.tags,
            author: self.author,
        };
        metadata.validate()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParamType, ParameterSpec};

    fn capability(name: &str) -> ToolCapability {
        ToolCapability::builder(name)
            .description("test")
            .input(ParameterSpec::new("location", ParamType::String).required())
            .build()
            .expect("capability")
    }

    #[test]
    fn builds_metadata() {
        let metadata = ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.2.3")
            .unwrap()
            .description("Weather lookups")
            .capability(capability("get_current"))
            .tag("weather")
            .unwrap()
            .author("ops")
            .build()
            .unwrap();

        assert_eq!(metadata.name(), "weather");
        assert_eq!(metadata.version(), "1.2.3");
        assert!(metadata.capability("get_current").is_some());
        assert_eq!(metadata.tags(), ["weather"]);
        assert_eq!(metadata.author(), Some("ops"));
    }

    #[test]
    fn version_is_required() {
        let result = ToolMetadata::builder("weather", ToolKind::Internal).build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_capabilities_rejected() {
        let result = ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .capability(capability("get_current"))
            .capability(capability("get_current"))
            .build();
        assert!(matches!(result, Err(Error::InvalidMetadata { .. })));
    }

    #[test]
    fn kind_serialises_with_plugin_subkind() {
        let value = serde_json::to_value(ToolKind::Plugin(PluginKind::HttpApi)).unwrap();
        assert_eq!(value, serde_json::json!({"plugin": "http_api"}));
        let kind: ToolKind = serde_json::from_value(serde_json::json!("internal")).unwrap();
        assert_eq!(kind, ToolKind::Internal);
    }
}
