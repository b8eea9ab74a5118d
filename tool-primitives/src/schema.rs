//! Parameter schema primitives used by capability inputs and outputs.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

/// Closed set of parameter types a capability schema may declare.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamType {
    /// Returns the JSON-schema type keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Returns `true` when the JSON value conforms to this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named parameter in a capability schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    name: String,
    #[serde(rename = "type")]
    param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    enum_values: Vec<Value>,
}

impl ParameterSpec {
    /// Creates an optional parameter of the supplied type.
    #[must_use]
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
            enum_values: Vec::new(),
        }
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Restricts the parameter to an enumerated set of values.
    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = values;
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn param_type(&self) -> ParamType {
        self.param_type
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns `true` when callers must supply the parameter.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the default value, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns the enumerated values, empty when unrestricted.
    #[must_use]
    pub fn enum_values(&self) -> &[Value] {
        &self.enum_values
    }

    /// Checks a supplied argument against this parameter.
    ///
    /// Returns a human-readable problem description when the value does not
    /// conform.
    #[must_use]
    pub fn check(&self, value: &Value) -> Option<String> {
        if !self.param_type.accepts(value) {
            return Some(format!(
                "parameter `{}` expects {}, got {}",
                self.name,
                self.param_type,
                json_type_name(value)
            ));
        }
        if !self.enum_values.is_empty() && !self.enum_values.contains(value) {
            return Some(format!(
                "parameter `{}` must be one of {}",
                self.name,
                Value::Array(self.enum_values.clone())
            ));
        }
        None
    }

    /// Renders the parameter as a JSON-schema property.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".into(), Value::from(self.param_type.as_str()));
        if let Some(description) = &self.description {
            property.insert("description".into(), Value::from(description.clone()));
        }
        if let Some(default) = &self.default {
            property.insert("default".into(), default.clone());
        }
        if !self.enum_values.is_empty() {
            property.insert("enum".into(), Value::Array(self.enum_values.clone()));
        }
        Value::Object(property)
    }
}

/// Renders a parameter list as a JSON-schema `object`.
#[must_use]
pub fn object_schema(parameters: &[ParameterSpec]) -> Value {
    let properties: Map<String, Value> = parameters
        .iter()
        .map(|param| (param.name.clone(), param.to_json_schema()))
        .collect();
    let required: Vec<&str> = parameters
        .iter()
        .filter(|param| param.required)
        .map(ParameterSpec::name)
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Validates a parameter list belonging to `capability`.
pub(crate) fn validate_parameters(capability: &str, parameters: &[ParameterSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for param in parameters {
        if param.name.trim().is_empty() {
            return Err(Error::schema(capability, "parameter name cannot be empty"));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(Error::schema(
                capability,
                format!("duplicate parameter `{}`", param.name),
            ));
        }
    }

    for param in parameters {
        if let Some(default) = &param.default {
            if let Some(problem) = param.check(default) {
                return Err(Error::schema(capability, format!("invalid default: {problem}")));
            }
            if param.required {
                if let Some(target) = field_reference(default) {
                    if seen.contains(target) {
                        return Err(Error::schema(
                            capability,
                            format!(
                                "required parameter `{}` has a default referencing field `{target}`",
                                param.name
                            ),
                        ));
                    }
                }
            }
        }
        if let Some(bad) = param
            .enum_values
            .iter()
            .find(|value| !param.param_type.accepts(value))
        {
            return Err(Error::schema(
                capability,
                format!(
                    "enum value {bad} of parameter `{}` is not a {}",
                    param.name, param.param_type
                ),
            ));
        }
    }

    Ok(())
}

/// Extracts the field name from `"${field}"` or `"{{field}}"` style defaults.
fn field_reference(value: &Value) -> Option<&str> {
    let text = value.as_str()?.trim();
    let inner = text
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .or_else(|| {
            text.strip_prefix("{{")
                .and_then(|rest| rest.strip_suffix("}}"))
        })?;
    Some(inner.trim())
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
