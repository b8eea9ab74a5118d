//! JSON-RPC `tools/list` and `tools/call` front end.

use std::sync::Arc;

use serde_json::{Value, json};
use tool_executor::{CallerIdentity, ExecutionRequest, ExecutionResult, ToolExecutor, ValueMap};
use tracing::{debug, warn};

use crate::projection::{CapabilityProjector, split_projected_name};
use crate::rpc::{PARSE_ERROR, RpcError, RpcRequest, RpcResponse};
use crate::validation::validate_call;

/// Method listing the projected tools.
pub const TOOLS_LIST: &str = "tools/list";
/// Method invoking one projected tool.
pub const TOOLS_CALL: &str = "tools/call";

/// Serves the tool protocol over a projector and an executor.
#[derive(Clone)]
pub struct ProtocolHandler {
    projector: CapabilityProjector,
    executor: Arc<dyn ToolExecutor>,
}

impl std::fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("projector", &self.projector)
            .finish_non_exhaustive()
    }
}

impl ProtocolHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(projector: CapabilityProjector, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { projector, executor }
    }

    /// The projector used for listings and validation.
    #[must_use]
    pub fn projector(&self) -> &CapabilityProjector {
        &self.projector
    }

    /// Handles a `tools/call` for the projected `name`.
    ///
    /// Malformed calls are rejected before the executor is reached. Execution
    /// failures are not protocol errors; they come back with `isError: true`.
    ///
    /// # Errors
    ///
    /// Returns an `-32602` [`RpcError`] when the name does not resolve, the
    /// arguments are not an object, or input validation fails.
    pub async fn handle_protocol_call(
        &self,
        name: &str,
        arguments: Value,
        caller: &CallerIdentity,
    ) -> Result<Value, RpcError> {
        let Some((tool, capability)) = split_projected_name(name) else {
            return Err(RpcError::invalid_params(format!(
                "`{name}` is not a `tool__capability` name"
            )));
        };
        let input = match arguments {
            Value::Object(map) => map,
            Value::Null => ValueMap::new(),
            _ => return Err(RpcError::invalid_params("arguments must be an object")),
        };

        let issues = validate_call(self.projector.registry(), tool, capability, &input);
        if !issues.is_empty() {
            debug!(tool, capability, issues = issues.len(), "rejected protocol call");
            return Err(RpcError::invalid_params(format!("invalid call to `{name}`"))
                .with_data(json!({ "issues": issues })));
        }

        let request = ExecutionRequest::new(tool, capability, input).with_caller(caller.clone());
        let result = self.executor.execute(request).await;
        Ok(wrap_result(&result))
    }

    /// Dispatches one request.
    pub async fn handle_request(&self, request: RpcRequest, caller: &CallerIdentity) -> RpcResponse {
        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return RpcResponse::invalid_request(id, "jsonrpc must be \"2.0\"");
        }
        match request.method.as_str() {
            TOOLS_LIST => self.projector.tool_list_response(id, caller),
            TOOLS_CALL => {
                let params = request.params.unwrap_or(Value::Null);
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return RpcResponse::failure(id, RpcError::invalid_params("missing `name`"));
                };
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                match self.handle_protocol_call(name, arguments, caller).await {
                    Ok(result) => RpcResponse::success(id, result),
                    Err(error) => RpcResponse::failure(id, error),
                }
            }
            other => RpcResponse::method_not_found(id, other),
        }
    }

    /// Parses and dispatches a raw JSON message.
    pub async fn handle_message(&self, message: &str, caller: &CallerIdentity) -> RpcResponse {
        let value: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparseable protocol message");
                return RpcResponse::failure(None, RpcError::new(PARSE_ERROR, err.to_string()));
            }
        };
        let id = value.get("id").cloned();
        match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) => self.handle_request(request, caller).await,
            Err(err) => RpcResponse::invalid_request(id, err.to_string()),
        }
    }
}

fn wrap_result(result: &ExecutionResult) -> Value {
    let text = match &result.error {
        None => Value::Object(result.output.clone()).to_string(),
        Some(error) => error.to_string(),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": !result.success,
    })
}
