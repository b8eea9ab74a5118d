//! Routing results and the router trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Language tag matching every language.
pub const ANY_LANGUAGE: &str = "any";

/// Confidence reported for default-tool fallbacks.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// A scored alternative to the selected tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Tool name.
    pub tool: String,
    /// Capability hint, when one was matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Score in `[0, 1]`.
    pub confidence: f64,
}

/// The router's decision for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMatch {
    /// Selected tool.
    pub tool: String,
    /// Capability hint, when one was matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Score in `[0, 1]`.
    pub confidence: f64,
    /// Patterns that matched the selected tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_patterns: Vec<String>,
    /// Free-text rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Runner-up candidates, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Candidate>,
    /// Detected language of the request.
    pub language: String,
    /// The selected tool needs conversation context to act.
    #[serde(default)]
    pub requires_context: bool,
    /// No candidate reached the threshold; `tool` is the default tool.
    #[serde(default)]
    pub fallback: bool,
}

impl ToolMatch {
    /// Builds a default-tool fallback.
    #[must_use]
    pub fn fallback(
        default_tool: impl Into<String>,
        language: impl Into<String>,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            tool: default_tool.into(),
            capability: None,
            confidence: FALLBACK_CONFIDENCE,
            matched_patterns: Vec::new(),
            reasoning,
            alternatives: Vec::new(),
            language: language.into(),
            requires_context: false,
            fallback: true,
        }
    }

    /// Returns `true` when this is a default-tool fallback.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Caller-side information that may influence routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingContext {
    /// Calling user, used to hide tools the user may not call.
    pub user: Option<String>,
    /// Language tag overriding detection.
    pub language: Option<String>,
    /// Recent conversation turns, oldest first.
    pub history: Vec<String>,
}

impl RoutingContext {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the calling user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Forces the request language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Appends a conversation turn.
    #[must_use]
    pub fn with_turn(mut self, turn: impl Into<String>) -> Self {
        self.history.push(turn.into());
        self
    }
}

/// Chooses a tool for a natural-language request.
///
/// Implementations never fail: problems are absorbed into a fallback match.
#[async_trait]
pub trait CapabilityRouter: Send + Sync {
    /// Routes `text` to a tool.
    async fn route(&self, text: &str, context: &RoutingContext) -> ToolMatch;
}
