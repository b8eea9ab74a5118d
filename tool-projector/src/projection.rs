//! Renders the callable capability set into LLM tool-calling formats.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tool_executor::CallerIdentity;
use tool_primitives::{ToolCapability, object_schema};
use tool_registry::{ToolFilter, ToolRecord, ToolRegistry};

use crate::rpc::RpcResponse;

/// Separator between tool and capability in projected names.
///
/// Identifiers may not contain it, so a projected name splits unambiguously.
pub const NAME_SEPARATOR: &str = "__";

/// Target format of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionFormat {
    /// `[{name, description, parameters}]` function declarations.
    FunctionCalling,
    /// `<tools>` tagged-block prompt text.
    TaggedBlocks,
    /// JSON-RPC `tools/list` response.
    ProtocolToolList,
}

/// One function-calling declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// Projected name, `{tool}__{capability}`.
    pub name: String,
    /// Capability description.
    pub description: String,
    /// JSON schema of the input.
    pub parameters: Value,
}

/// Output of [`CapabilityProjector::project_for`].
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Function declarations.
    Functions(Vec<FunctionDeclaration>),
    /// Tagged-block prompt text.
    Text(String),
    /// `tools/list` response carrying the id it was projected for.
    ToolList(RpcResponse),
}

impl Projection {
    /// JSON rendering; text projections become a JSON string.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Functions(functions) => json!(functions),
            Self::Text(text) => Value::String(text.clone()),
            Self::ToolList(response) => json!(response),
        }
    }
}

/// Returns `{tool}__{capability}`.
#[must_use]
pub fn projected_name(tool: &str, capability: &str) -> String {
    format!("{tool}{NAME_SEPARATOR}{capability}")
}

/// Splits a projected name into tool and capability.
#[must_use]
pub fn split_projected_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAME_SEPARATOR)
        .filter(|(tool, capability)| !tool.is_empty() && !capability.is_empty())
}

fn describe(record: &ToolRecord, capability: &ToolCapability) -> String {
    if !capability.description().trim().is_empty() {
        return capability.description().to_owned();
    }
    record
        .metadata()
        .description()
        .map_or_else(|| capability.name().to_owned(), str::to_owned)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Pure projection of the registry's callable capabilities.
#[derive(Debug, Clone)]
pub struct CapabilityProjector {
    registry: Arc<ToolRegistry>,
}

impl CapabilityProjector {
    /// Creates a projector over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The registry being projected.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Enabled, non-open tools `caller` may use, each with the capabilities
    /// whose permissions the caller holds. Tools left without capabilities
    /// are omitted.
    #[must_use]
    pub fn callable(&self, caller: &CallerIdentity) -> Vec<(ToolRecord, Vec<ToolCapability>)> {
        self.registry
            .list(ToolFilter::available())
            .into_iter()
            .filter(|record| record.config().permits_user(caller.user.as_deref()))
            .filter_map(|record| {
                let capabilities: Vec<_> = record
                    .metadata()
                    .capabilities()
                    .iter()
                    .filter(|capability| caller.missing(capability.required_permissions()).is_empty())
                    .cloned()
                    .collect();
                (!capabilities.is_empty()).then_some((record, capabilities))
            })
            .collect()
    }

    /// Function-calling declarations.
    #[must_use]
    pub fn functions(&self, caller: &CallerIdentity) -> Vec<FunctionDeclaration> {
        self.callable(caller)
            .iter()
            .flat_map(|(record, capabilities)| {
                capabilities.iter().map(move |capability| FunctionDeclaration {
                    name: projected_name(record.name(), capability.name()),
                    description: describe(record, capability),
                    parameters: object_schema(capability.input_schema()),
                })
            })
            .collect()
    }

    /// Tagged-block prompt text.
    #[must_use]
    pub fn tagged_blocks(&self, caller: &CallerIdentity) -> String {
        let mut text = String::from("<tools>\n");
        for (record, capabilities) in self.callable(caller) {
            let metadata = record.metadata();
            let _ = writeln!(
                text,
                "  <tool name=\"{}\" version=\"{}\">",
                escape(metadata.name()),
                escape(metadata.version())
            );
            if let Some(description) = metadata.description() {
                let _ = writeln!(text, "    <description>{}</description>", escape(description));
            }
            for capability in &capabilities {
                let _ = writeln!(
                    text,
                    "    <capability name=\"{}\" call=\"{}\">",
                    escape(capability.name()),
                    escape(&projected_name(metadata.name(), capability.name()))
                );
                if !capability.description().is_empty() {
                    let _ = writeln!(
                        text,
                        "      <description>{}</description>",
                        escape(capability.description())
                    );
                }
                for parameter in capability.input_schema() {
                    let _ = writeln!(
                        text,
                        "      <parameter name=\"{}\" type=\"{}\" required=\"{}\">{}</parameter>",
                        escape(parameter.name()),
                        parameter.param_type(),
                        parameter.is_required(),
                        escape(parameter.description().unwrap_or_default())
                    );
                }
                text.push_str("    </capability>\n");
            }
            text.push_str("  </tool>\n");
        }
        text.push_str("</tools>");
        text
    }

    /// `tools/list` result body: `{tools: [{name, description, inputSchema}]}`.
    #[must_use]
    pub fn tool_list(&self, caller: &CallerIdentity) -> Value {
        let tools: Vec<Value> = self
            .functions(caller)
            .into_iter()
            .map(|function| {
                json!({
                    "name": function.name,
                    "description": function.description,
                    "inputSchema": function.parameters,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// Complete `tools/list` response answering the request `id`.
    #[must_use]
    pub fn tool_list_response(&self, id: Option<Value>, caller: &CallerIdentity) -> RpcResponse {
        RpcResponse::success(id, self.tool_list(caller))
    }

    /// Projects the callable set into `format`.
    ///
    /// A [`ProjectionFormat::ProtocolToolList`] projection is not tied to a
    /// request and carries a null id; use [`Self::project_request`] to answer
    /// one.
    #[must_use]
    pub fn project_for(&self, format: ProjectionFormat, caller: &CallerIdentity) -> Projection {
        self.project_request(format, None, caller)
    }

    /// [`Self::project_for`] answering the JSON-RPC request `id`. Only the
    /// tool list format carries the id.
    #[must_use]
    pub fn project_request(
        &self,
        format: ProjectionFormat,
        id: Option<Value>,
        caller: &CallerIdentity,
    ) -> Projection {
        match format {
            ProjectionFormat::FunctionCalling => Projection::Functions(self.functions(caller)),
            ProjectionFormat::TaggedBlocks => Projection::Text(self.tagged_blocks(caller)),
            ProjectionFormat::ProtocolToolList => {
                Projection::ToolList(self.tool_list_response(id, caller))
            }
        }
    }
}
