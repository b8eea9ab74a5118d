//! Execution requests, results, and the error taxonomy.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Input and output maps exchanged with capabilities.
pub type ValueMap = Map<String, Value>;

/// Who is calling, and with which grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Calling user; `None` for anonymous callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Session the call belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Permission tags granted to the caller.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub permissions: BTreeSet<String>,
}

impl CallerIdentity {
    /// Anonymous caller with no grants.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Caller acting as `user`.
    #[must_use]
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::default()
        }
    }

    /// Sets the session identifier.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Grants a permission tag.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Returns the tags in `required` this caller lacks.
    #[must_use]
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|tag| !self.permissions.contains(tag.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// A single capability invocation.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    id: Uuid,
    tool: String,
    capability: String,
    input: ValueMap,
    caller: CallerIdentity,
    deadline: Option<Instant>,
}

impl ExecutionRequest {
    /// Creates an anonymous request without a deadline.
    #[must_use]
    pub fn new(tool: impl Into<String>, capability: impl Into<String>, input: ValueMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: tool.into(),
            capability: capability.into(),
            input,
            caller: CallerIdentity::anonymous(),
            deadline: None,
        }
    }

    /// Sets the caller.
    #[must_use]
    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Request identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Target tool.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Target capability.
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Input map.
    #[must_use]
    pub fn input(&self) -> &ValueMap {
        &self.input
    }

    /// Calling identity.
    #[must_use]
    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Caller-supplied deadline.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Classification of every failure the runtime reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, schema, or request.
    Validation,
    /// A plugin failed the security scan.
    SecurityViolation,
    /// A plugin archive could not be loaded.
    PluginLoad,
    /// Routing fell back to the default tool. Absorbed by routers.
    RoutingFallback,
    /// The tool's circuit is open.
    ToolUnavailable,
    /// The execution deadline passed.
    ExecutionTimeout,
    /// The backend reported or caused a failure.
    ExecutionFailure,
    /// A model-delegated decision failed. Absorbed by routers.
    UpstreamEvaluation,
    /// No tool of that name is registered.
    UnknownTool,
    /// The tool is registered but disabled.
    ToolDisabled,
    /// The caller may not use the tool or capability.
    PermissionDenied,
    /// The tool's concurrency queue is full.
    Backpressure,
    /// The tool was unregistered mid-flight.
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` when retrying later may succeed.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::ToolUnavailable | Self::ExecutionTimeout | Self::Backpressure
        )
    }

    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::SecurityViolation => "security_violation",
            Self::PluginLoad => "plugin_load",
            Self::RoutingFallback => "routing_fallback",
            Self::ToolUnavailable => "tool_unavailable",
            Self::ExecutionTimeout => "execution_timeout",
            Self::ExecutionFailure => "execution_failure",
            Self::UpstreamEvaluation => "upstream_evaluation",
            Self::UnknownTool => "unknown_tool",
            Self::ToolDisabled => "tool_disabled",
            Self::PermissionDenied => "permission_denied",
            Self::Backpressure => "backpressure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure attached to an [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of an [`ExecutionRequest`]. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Identifier of the originating request.
    pub request_id: Uuid,
    /// Target tool.
    pub tool: String,
    /// Target capability.
    pub capability: String,
    /// `true` when the capability completed.
    pub success: bool,
    /// Capability output; empty on failure.
    #[serde(default)]
    pub output: ValueMap,
    /// Failure detail; `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Wall-clock time spent in the service.
    pub duration: Duration,
    /// Journal entry recording this attempt, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_entry: Option<Uuid>,
}

impl ExecutionResult {
    pub(crate) fn succeeded(request: &ExecutionRequest, output: ValueMap, duration: Duration) -> Self {
        Self {
            request_id: request.id(),
            tool: request.tool().to_owned(),
            capability: request.capability().to_owned(),
            success: true,
            output,
            error: None,
            duration,
            journal_entry: None,
        }
    }

    pub(crate) fn failed(
        request: &ExecutionRequest,
        kind: ErrorKind,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            request_id: request.id(),
            tool: request.tool().to_owned(),
            capability: request.capability().to_owned(),
            success: false,
            output: ValueMap::new(),
            error: Some(ExecutionError {
                kind,
                message: message.into(),
            }),
            duration,
            journal_entry: None,
        }
    }

    /// Failure classification, if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }
}

/// Wraps non-object outputs as `{"result": value}`.
pub(crate) fn into_output_map(value: Value) -> ValueMap {
    match value {
        Value::Object(map) => map,
        Value::Null => ValueMap::new(),
        other => {
            let mut map = ValueMap::new();
            map.insert("result".to_owned(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(ErrorKind::ToolUnavailable.is_retriable());
        assert!(ErrorKind::ExecutionTimeout.is_retriable());
        assert!(ErrorKind::Backpressure.is_retriable());
        assert!(!ErrorKind::Validation.is_retriable());
        assert!(!ErrorKind::Cancelled.is_retriable());
        assert_eq!(ErrorKind::PermissionDenied.to_string(), "permission_denied");
        assert_eq!(
            serde_json::to_value(ErrorKind::ExecutionFailure).unwrap(),
            json!("execution_failure")
        );
    }

    #[test]
    fn caller_reports_missing_permissions() {
        let caller = CallerIdentity::user("ada").with_permission("net");
        let required = vec!["net".to_owned(), "fs.read".to_owned()];
        assert_eq!(caller.missing(&required), ["fs.read"]);
    }

    #[test]
    fn scalar_outputs_are_wrapped() {
        assert_eq!(into_output_map(json!(42))["result"], json!(42));
        assert!(into_output_map(Value::Null).is_empty());
        assert_eq!(into_output_map(json!({"a": 1}))["a"], json!(1));
    }
}
