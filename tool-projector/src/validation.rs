//! Pre-execution validation of tool calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tool_executor::ValueMap;
use tool_registry::ToolRegistry;

/// What is wrong with a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// No tool of that name is registered.
    UnknownTool,
    /// The tool has no such capability.
    UnknownCapability,
    /// A required parameter is absent or null.
    MissingParameter,
    /// A parameter has the wrong JSON type.
    TypeMismatch,
    /// A parameter is outside its enumerated values.
    EnumViolation,
}

/// One problem found by [`validate_call`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Classification.
    pub kind: IssueKind,
    /// Offending parameter, when the issue concerns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, parameter: Option<&str>, message: String) -> Self {
        Self {
            kind,
            parameter: parameter.map(str::to_owned),
            message,
        }
    }
}

/// Checks `input` against the capability's input schema.
///
/// Returns every issue found, empty when the call is valid. Parameters not
/// declared by the schema are ignored.
#[must_use]
pub fn validate_call(
    registry: &ToolRegistry,
    tool: &str,
    capability: &str,
    input: &ValueMap,
) -> Vec<ValidationIssue> {
    let Some(record) = registry.get(tool) else {
        return vec![ValidationIssue::new(
            IssueKind::UnknownTool,
            None,
            format!("tool `{tool}` is not registered"),
        )];
    };
    let Some(declared) = record.metadata().capability(capability) else {
        return vec![ValidationIssue::new(
            IssueKind::UnknownCapability,
            None,
            format!("tool `{tool}` has no capability `{capability}`"),
        )];
    };

    let mut issues = Vec::new();
    for parameter in declared.input_schema() {
        let name = parameter.name();
        match input.get(name) {
            None | Some(Value::Null) => {
                if parameter.is_required() && parameter.default_value().is_none() {
                    issues.push(ValidationIssue::new(
                        IssueKind::MissingParameter,
                        Some(name),
                        format!("missing required parameter `{name}`"),
                    ));
                }
            }
            Some(value) => {
                if let Some(message) = parameter.check(value) {
                    let kind = if parameter.param_type().accepts(value) {
                        IssueKind::EnumViolation
                    } else {
                        IssueKind::TypeMismatch
                    };
                    issues.push(ValidationIssue::new(kind, Some(name), message));
                }
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tool_primitives::{
        ParamType, ParameterSpec, ToolCapability, ToolConfiguration, ToolKind, ToolMetadata,
    };

    use super::*;

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        let metadata = ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .capability(
                ToolCapability::builder("get_current")
                    .description("Current conditions")
                    .input(ParameterSpec::new("location", ParamType::String).required())
                    .input(
                        ParameterSpec::new("units", ParamType::String)
                            .with_enum(vec![json!("metric"), json!("imperial")]),
                    )
                    .input(ParameterSpec::new("days", ParamType::Integer))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        registry.register(metadata, ToolConfiguration::new()).unwrap();
        registry
    }

    fn input(value: serde_json::Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn valid_calls_have_no_issues() {
        let registry = registry();
        let issues = validate_call(
            &registry,
            "weather",
            "get_current",
            &input(json!({"location": "Istanbul", "units": "metric", "extra": 1})),
        );
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn reports_every_problem() {
        let registry = registry();
        let issues = validate_call(
            &registry,
            "weather",
            "get_current",
            &input(json!({"units": "kelvin", "days": "three"})),
        );
        let kinds: Vec<_> = issues.iter().map(|issue| issue.kind).collect();
        assert_eq!(
            kinds,
            [
                IssueKind::MissingParameter,
                IssueKind::EnumViolation,
                IssueKind::TypeMismatch
            ]
        );
        assert_eq!(issues[0].parameter.as_deref(), Some("location"));
    }

    #[test]
    fn unknown_targets() {
        let registry = registry();
        assert_eq!(
            validate_call(&registry, "stocks", "quote", &ValueMap::new())[0].kind,
            IssueKind::UnknownTool
        );
        assert_eq!(
            validate_call(&registry, "weather", "teleport", &ValueMap::new())[0].kind,
            IssueKind::UnknownCapability
        );
    }
}
