//! Capability descriptors exposed by tools.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::{ParameterSpec, validate_parameters};
use crate::validate_identifier;

const MAX_PERMISSION_LEN: usize = 64;

/// Example invocation attached to a capability for prompt enrichment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityExample {
    /// Sample input arguments.
    pub input: Value,
    /// Output the capability produced for [`Self::input`].
    pub output: Value,
}

/// A single named operation exposed by a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCapability {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    input_schema: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    output_schema: Vec<ParameterSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    examples: Vec<CapabilityExample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_permissions: Vec<String>,
}

impl ToolCapability {
    /// Starts building a capability descriptor.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ToolCapabilityBuilder {
        ToolCapabilityBuilder {
            name: name.into(),
            description: String::new(),
            input_schema: Vec::new(),
            output_schema: Vec::new(),
            examples: Vec::new(),
            required_permissions: BTreeSet::new(),
        }
    }

    /// Returns the capability name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the declared input parameters.
    #[must_use]
    pub fn input_schema(&self) -> &[ParameterSpec] {
        &self.input_schema
    }

    /// Returns the declared output fields.
    #[must_use]
    pub fn output_schema(&self) -> &[ParameterSpec] {
        &self.output_schema
    }

    /// Returns the example input/output pairs.
    #[must_use]
    pub fn examples(&self) -> &[CapabilityExample] {
        &self.examples
    }

    /// Returns the permission tags a caller must hold.
    #[must_use]
    pub fn required_permissions(&self) -> &[String] {
        &self.required_permissions
    }

    /// Looks up an input parameter by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&ParameterSpec> {
        self.input_schema.iter().find(|param| param.name() == name)
    }

    /// Validates the capability name and both schemas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for a malformed name and
    /// [`Error::InvalidSchema`] for malformed input or output schemas.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        validate_parameters(&self.name, &self.input_schema)?;
        validate_parameters(&self.name, &self.output_schema)?;
        for permission in &self.required_permissions {
            validate_permission(&self.name, permission)?;
        }
        Ok(())
    }
}

/// Builder for [`ToolCapability`].
#[derive(Debug)]
pub struct ToolCapabilityBuilder {
    name: String,
    description: String,
    input_schema: Vec<ParameterSpec>,
    output_schema: Vec<ParameterSpec>,
    examples: Vec<CapabilityExample>,
    required_permissions: BTreeSet<String>,
}

impl ToolCapabilityBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends an input parameter.
    #[must_use]
    pub fn input(mut self, parameter: ParameterSpec) -> Self {
        self.input_schema.push(parameter);
        self
    }

    /// Appends an output field.
    #[must_use]
    pub fn output(mut self, parameter: ParameterSpec) -> Self {
        self.output_schema.push(parameter);
        self
    }

    /// Adds an example invocation.
    #[must_use]
    pub fn example(mut self, input: Value, output: Value) -> Self {
        self.examples.push(CapabilityExample { input, output });
        self
    }

    /// Adds a required permission tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] if the tag is empty or too long.
    pub fn permission(mut self, permission: impl Into<String>) -> Result<Self> {
        let permission = permission.into();
        validate_permission(&self.name, &permission)?;
        self.required_permissions.insert(permission);
        Ok(self)
    }

    /// Finalises and validates the capability.
    ///
    /// # Errors
    ///
    /// Propagates any failure from [`ToolCapability::validate`].
    pub fn build(self) -> Result<ToolCapability> {
        let capability = ToolCapability {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
            examples: self.examples,
            required_permissions: self.required_permissions.into_iter().collect(),
        };
        capability.validate()?;
        Ok(capability)
    }
}

fn validate_permission(capability: &str, permission: &str) -> Result<()> {
    if permission.trim().is_empty() {
        return Err(Error::schema(capability, "permission tag cannot be empty"));
    }
    if permission.len() > MAX_PERMISSION_LEN {
        return Err(Error::schema(
            capability,
            format!("permission tag length must be <= {MAX_PERMISSION_LEN}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamType;
    use serde_json::json;

    #[test]
    fn build_capability_success() {
        let capability = ToolCapability::builder("get_current")
            .description("Current conditions for a location")
            .input(ParameterSpec::new("location", ParamType::String).required())
            .output(ParameterSpec::new("temperature", ParamType::Number))
            .example(json!({"location": "Istanbul"}), json!({"temperature": 21.5}))
            .permission("weather:read")
            .and_then(ToolCapabilityBuilder::build)
            .expect("build");

        assert_eq!(capability.name(), "get_current");
        assert!(capability.input("location").unwrap().is_required());
        assert_eq!(capability.required_permissions(), ["weather:read"]);
        assert_eq!(capability.examples().len(), 1);
    }

    #[test]
    fn malformed_name_rejected() {
        let err = ToolCapability::builder("Get Current")
            .build()
            .expect_err("should fail");
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
    }

    #[test]
    fn deserialized_capability_validates() {
        let capability: ToolCapability = serde_json::from_value(json!({
            "name": "get_current",
            "description": "Current conditions",
            "input_schema": [
                {"name": "location", "type": "string", "required": true},
                {"name": "location", "type": "string"}
            ]
        }))
        .unwrap();

        let err = capability.validate().expect_err("duplicate parameter");
        assert!(matches!(err, Error::InvalidSchema { .. }));
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let parsed = serde_json::from_value::<ToolCapability>(json!({
            "name": "get_current",
            "input_schema": [{"name": "location", "type": "str"}]
        }));
        assert!(parsed.is_err());
    }
}
