//! Model-delegated routing strategy.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tool_adapters::{
    AdapterError, InferenceRequest, MessageRole, ModelAdapter, PromptMessage, ResponseFormat,
    collect_text,
};
use tool_registry::{ToolFilter, ToolRegistry};
use tracing::{debug, warn};

use crate::language::detect_language;
use crate::types::{CapabilityRouter, Candidate, RoutingContext, ToolMatch};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const CAPABILITIES_PER_TOOL: usize = 5;
const HISTORY_TURNS: usize = 5;

const SYSTEM_PROMPT: &str = "You select the single best tool for a user request. \
Answer with one JSON object and nothing else: \
{\"selected_tool\": string, \"capability\": string or null, \"confidence\": number between 0 and 1, \
\"reasoning\": string, \"alternatives\": [string], \"requires_context\": boolean}.";

/// Errors raised while asking the model for a decision.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// The model did not answer in time.
    #[error("model evaluation timed out after {0:?}")]
    Timeout(Duration),
    /// The answer contained no JSON object.
    #[error("model answer contained no JSON object")]
    NoJson,
    /// The JSON object lacked required fields.
    #[error("malformed model decision: {0}")]
    Malformed(String),
    /// The model chose a tool that is not registered.
    #[error("model selected unknown tool `{0}`")]
    UnknownTool(String),
    /// The model chose a registered tool that was not offered to it, such as
    /// a disabled tool or one the caller may not use.
    #[error("model selected tool `{0}` that was not offered")]
    NotOffered(String),
    /// No tool is available to choose from.
    #[error("no tools available for routing")]
    NoTools,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Alternative {
    Name(String),
    Scored {
        tool: String,
        #[serde(default)]
        confidence: f64,
    },
}

#[derive(Debug, Deserialize)]
struct Decision {
    selected_tool: String,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    alternatives: Vec<Alternative>,
    #[serde(default)]
    requires_context: bool,
    #[serde(default)]
    capability: Option<String>,
}

/// Returns the first balanced `{...}` object in `text`, skipping braces
/// inside JSON strings.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Routes by asking a language model to pick among the available tools.
pub struct DelegatedRouter {
    adapter: Arc<dyn ModelAdapter>,
    registry: Arc<ToolRegistry>,
    default_tool: String,
    timeout: Duration,
}

impl std::fmt::Debug for DelegatedRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedRouter")
            .field("adapter", self.adapter.metadata())
            .field("default_tool", &self.default_tool)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DelegatedRouter {
    /// Creates a router falling back to `general` after a 10 second timeout.
    #[must_use]
    pub fn new(adapter: Arc<dyn ModelAdapter>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            adapter,
            registry,
            default_tool: "general".to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the fallback tool.
    #[must_use]
    pub fn with_default_tool(mut self, tool: impl Into<String>) -> Self {
        self.default_tool = tool.into();
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the user prompt and returns it with the names of the tools it
    /// offers.
    fn build_prompt(
        &self,
        text: &str,
        context: &RoutingContext,
    ) -> Result<(String, Vec<String>), EvaluationError> {
        let tools: Vec<_> = self
            .registry
            .list(ToolFilter::available())
            .into_iter()
            .filter(|record| record.config().permits_user(context.user.as_deref()))
            .collect();
        if tools.is_empty() {
            return Err(EvaluationError::NoTools);
        }

        let mut prompt = String::from("Available tools:\n");
        for record in &tools {
            let metadata = record.metadata();
            let _ = writeln!(
                prompt,
                "- {}: {}",
                metadata.name(),
                metadata.description().unwrap_or("no description")
            );
            for capability in metadata.capabilities().iter().take(CAPABILITIES_PER_TOOL) {
                let _ = writeln!(prompt, "  - {}: {}", capability.name(), capability.description());
            }
        }

        if !context.history.is_empty() {
            prompt.push_str("\nRecent conversation:\n");
            let skip = context.history.len().saturating_sub(HISTORY_TURNS);
            for turn in &context.history[skip..] {
                let _ = writeln!(prompt, "- {turn}");
            }
        }

        let _ = write!(prompt, "\nRequest: {text}");
        let offered = tools
            .iter()
            .map(|record| record.metadata().name().to_owned())
            .collect();
        Ok((prompt, offered))
    }

    /// Asks the model for a decision.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] when the adapter fails or times out, or
    /// when its answer is not a usable decision naming one of the tools
    /// listed in the prompt.
    pub async fn evaluate(
        &self,
        text: &str,
        context: &RoutingContext,
    ) -> Result<ToolMatch, EvaluationError> {
        let (prompt, offered) = self.build_prompt(text, context)?;
        let request = InferenceRequest::new(vec![PromptMessage::new(MessageRole::User, prompt)])?
            .with_system_prompt(SYSTEM_PROMPT)
            .with_response_format(ResponseFormat::JsonObject)
            .with_temperature(0.0);

        let answer = tokio::time::timeout(self.timeout, async {
            let stream = self.adapter.infer(request).await?;
            collect_text(stream).await
        })
        .await
        .map_err(|_| EvaluationError::Timeout(self.timeout))??;

        let json = extract_json(&answer).ok_or(EvaluationError::NoJson)?;
        let decision: Decision =
            serde_json::from_str(json).map_err(|err| EvaluationError::Malformed(err.to_string()))?;
        if !offered.contains(&decision.selected_tool) {
            return Err(if self.registry.contains(&decision.selected_tool) {
                EvaluationError::NotOffered(decision.selected_tool)
            } else {
                EvaluationError::UnknownTool(decision.selected_tool)
            });
        }

        let language = context
            .language
            .clone()
            .unwrap_or_else(|| detect_language(text).to_owned());
        let alternatives = decision
            .alternatives
            .into_iter()
            .map(|alternative| match alternative {
                Alternative::Name(tool) => Candidate {
                    tool,
                    capability: None,
                    confidence: 0.0,
                },
                Alternative::Scored { tool, confidence } => Candidate {
                    tool,
                    capability: None,
                    confidence: confidence.clamp(0.0, 1.0),
                },
            })
            .filter(|candidate| {
                candidate.tool != decision.selected_tool && offered.contains(&candidate.tool)
            })
            .collect();

        debug!(
            tool = %decision.selected_tool,
            confidence = decision.confidence,
            model = self.adapter.metadata().model(),
            "routed by model"
        );
        Ok(ToolMatch {
            tool: decision.selected_tool,
            capability: decision.capability,
            confidence: if decision.confidence.is_finite() {
                decision.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            matched_patterns: Vec::new(),
            reasoning: Some(decision.reasoning),
            alternatives,
            language,
            requires_context: decision.requires_context,
            fallback: false,
        })
    }
}

#[async_trait]
impl CapabilityRouter for DelegatedRouter {
    async fn route(&self, text: &str, context: &RoutingContext) -> ToolMatch {
        match self.evaluate(text, context).await {
            Ok(found) => found,
            Err(err) => {
                warn!(%err, default_tool = %self.default_tool, "model routing failed");
                let language = context
                    .language
                    .clone()
                    .unwrap_or_else(|| detect_language(text).to_owned());
                ToolMatch::fallback(self.default_tool.clone(), language, Some(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::stream;
    use tool_adapters::{AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk};
    use tool_primitives::{ToolCapability, ToolConfiguration, ToolKind, ToolMetadata};

    use super::*;

    struct StaticAdapter {
        metadata: AdapterMetadata,
        answer: String,
        delay: Duration,
        prompts: Mutex<Vec<String>>,
    }

    impl StaticAdapter {
        fn new(answer: &str) -> Self {
            Self {
                metadata: AdapterMetadata::new("static", "fixture"),
                answer: answer.to_owned(),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelAdapter for StaticAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }

        async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.messages()[0].content().to_owned());
            tokio::time::sleep(self.delay).await;
            let (head, tail) = self.answer.split_at(self.answer.len() / 2);
            let chunks = vec![
                Ok(InferenceChunk::new(head, false)),
                Ok(InferenceChunk::new(tail, true)),
            ];
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        let weather = ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .description("Weather lookups")
            .capability(
                ToolCapability::builder("get_current")
                    .description("Current conditions")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        registry.register(weather, ToolConfiguration::new()).unwrap();
        registry
    }

    #[test]
    fn extracts_first_balanced_object() {
        let text = r#"Sure! {"a": "brace } in string", "b": {"c": 1}} trailing {"d": 2}"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"a": "brace } in string", "b": {"c": 1}}"#)
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"open\": 1"), None);
    }

    #[tokio::test]
    async fn evaluates_model_decision() {
        let adapter = Arc::new(StaticAdapter::new(
            r#"Here you go: {"selected_tool": "weather", "capability": "get_current", "confidence": 1.4, "reasoning": "asks about weather", "alternatives": ["general", "weather"]}"#,
        ));
        let router = DelegatedRouter::new(adapter.clone(), registry());
        let context = RoutingContext::new().with_turn("hi").with_turn("I am in Istanbul");

        let found = router.evaluate("What's the weather?", &context).await.unwrap();
        assert_eq!(found.tool, "weather");
        assert_eq!(found.capability.as_deref(), Some("get_current"));
        assert!((found.confidence - 1.0).abs() < f64::EPSILON);
        // `general` was never offered and `weather` is the pick.
        assert!(found.alternatives.is_empty());
        assert!(!found.is_fallback());

        let prompt = adapter.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("- weather: Weather lookups"));
        assert!(prompt.contains("  - get_current: Current conditions"));
        assert!(prompt.contains("I am in Istanbul"));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_answers_fall_back() {
        for (answer, expected) in [
            (r#"{"selected_tool": "stocks", "confidence": 0.9, "reasoning": "x"}"#, "unknown"),
            ("I cannot decide", "no JSON"),
            (r#"{"selected_tool": "weather"}"#, "malformed"),
        ] {
            let router = DelegatedRouter::new(Arc::new(StaticAdapter::new(answer)), registry())
                .with_default_tool("chat");
            let err = router.evaluate("hello", &RoutingContext::new()).await.unwrap_err();
            assert!(err.to_string().contains(expected), "{err}");

            let found = router.route("hello", &RoutingContext::new()).await;
            assert_eq!(found.tool, "chat");
            assert!(found.is_fallback());
        }
    }

    #[tokio::test]
    async fn tools_left_out_of_the_prompt_fall_back() {
        let registry = registry();
        let stocks = ToolMetadata::builder("stocks", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .capability(ToolCapability::builder("quote").build().unwrap())
            .build()
            .unwrap();
        registry.register(stocks, ToolConfiguration::new()).unwrap();
        registry.set_enabled("stocks", false).unwrap();

        let adapter = Arc::new(StaticAdapter::new(
            r#"{"selected_tool": "stocks", "confidence": 0.9, "reasoning": "x"}"#,
        ));
        let router = DelegatedRouter::new(adapter.clone(), Arc::clone(&registry))
            .with_default_tool("weather");
        assert!(matches!(
            router.evaluate("AAPL price", &RoutingContext::new()).await,
            Err(EvaluationError::NotOffered(tool)) if tool == "stocks"
        ));
        assert!(!adapter.prompts.lock().unwrap()[0].contains("stocks"));

        let found = router.route("AAPL price", &RoutingContext::new()).await;
        assert_eq!(found.tool, "weather");
        assert!(found.is_fallback());

        // Restricted to other users.
        registry.set_enabled("stocks", true).unwrap();
        registry
            .update_config("stocks", ToolConfiguration::new().with_allowed_users(["grace"]))
            .unwrap();
        let context = RoutingContext::new().with_user("ada");
        assert!(matches!(
            router.evaluate("AAPL price", &context).await,
            Err(EvaluationError::NotOffered(_))
        ));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let mut adapter = StaticAdapter::new(r#"{"selected_tool": "weather", "confidence": 1, "reasoning": "r"}"#);
        adapter.delay = Duration::from_millis(200);
        let router = DelegatedRouter::new(Arc::new(adapter), registry())
            .with_timeout(Duration::from_millis(20));
        assert!(matches!(
            router.evaluate("weather", &RoutingContext::new()).await,
            Err(EvaluationError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn empty_registry_has_no_tools() {
        let router = DelegatedRouter::new(
            Arc::new(StaticAdapter::new("{}")),
            Arc::new(ToolRegistry::new()),
        );
        assert!(matches!(
            router.evaluate("anything", &RoutingContext::new()).await,
            Err(EvaluationError::NoTools)
        ));
    }
}
