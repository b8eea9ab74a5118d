//! Weighted-pattern routing strategy.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tool_registry::ToolRegistry;
use tracing::{debug, info, warn};

use crate::config::{PatternSpec, RoutingConfig, RoutingResult, RoutingSettings};
use crate::language::detect_language;
use crate::pattern::{self, CompiledPattern};
use crate::types::{ANY_LANGUAGE, CapabilityRouter, Candidate, RoutingContext, ToolMatch};

/// Discount applied to patterns written in a language other than the request's.
const MISMATCH_MULTIPLIER: f64 = 0.5;

/// Bonus contributed by each point of tool priority.
const PRIORITY_BONUS: f64 = 0.1;

/// Alternatives attached to a confident match.
const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone)]
struct ToolPatternSet {
    tool: String,
    priority: u32,
    patterns: Vec<CompiledPattern>,
}

#[derive(Debug, Clone)]
struct RouterState {
    settings: RoutingSettings,
    tools: Vec<ToolPatternSet>,
}

impl RouterState {
    fn compile(config: &RoutingConfig) -> RoutingResult<Self> {
        config.validate()?;
        let case_sensitive = config.settings.case_sensitive;
        let tools = config
            .tools
            .iter()
            .map(|(tool, spec)| {
                let patterns = spec
                    .patterns
                    .iter()
                    .map(|pattern| pattern::compile(tool, pattern, case_sensitive))
                    .collect::<RoutingResult<Vec<_>>>()?;
                Ok(ToolPatternSet {
                    tool: tool.clone(),
                    priority: spec.priority,
                    patterns,
                })
            })
            .collect::<RoutingResult<Vec<_>>>()?;
        Ok(Self {
            settings: config.settings.clone(),
            tools,
        })
    }

    fn pattern_count(&self) -> usize {
        self.tools.iter().map(|set| set.patterns.len()).sum()
    }
}

#[derive(Debug, Clone)]
struct Scored {
    tool: String,
    capability: Option<String>,
    confidence: f64,
    priority: u32,
    matched: Vec<String>,
}

impl From<&Scored> for Candidate {
    fn from(scored: &Scored) -> Self {
        Self {
            tool: scored.tool.clone(),
            capability: scored.capability.clone(),
            confidence: scored.confidence,
        }
    }
}

fn language_multiplier(pattern: &str, detected: &str, settings: &RoutingSettings) -> f64 {
    if pattern == ANY_LANGUAGE || detected == ANY_LANGUAGE {
        1.0
    } else if pattern == detected {
        settings
            .language_weights
            .get(detected)
            .copied()
            .unwrap_or(1.0)
    } else {
        MISMATCH_MULTIPLIER
    }
}

/// Routes requests by scoring weighted regular expressions per tool.
///
/// The compiled pattern set is swapped as a unit on reload, so concurrent
/// routing always sees either the old or the new set.
pub struct PatternRouter {
    state: RwLock<Arc<RouterState>>,
    registry: Option<Arc<ToolRegistry>>,
}

impl std::fmt::Debug for PatternRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        f.debug_struct("PatternRouter")
            .field("tools", &state.tools.len())
            .field("patterns", &state.pattern_count())
            .field("default_tool", &state.settings.default_tool)
            .finish_non_exhaustive()
    }
}

impl PatternRouter {
    /// Compiles a router from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RoutingError`] when settings are invalid or a
    /// pattern does not compile.
    pub fn new(config: &RoutingConfig) -> RoutingResult<Self> {
        Ok(Self {
            state: RwLock::new(Arc::new(RouterState::compile(config)?)),
            registry: None,
        })
    }

    /// Loads the YAML file at `path`, falling back to the minimal
    /// configuration when it is missing, malformed, or fails to compile.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let config = RoutingConfig::load_or_minimal(path);
        Self::new(&config).unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "using minimal routing configuration");
            Self::minimal()
        })
    }

    /// Router with no patterns; every request falls back to `general`.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            state: RwLock::new(Arc::new(RouterState {
                settings: RoutingSettings::default(),
                tools: Vec::new(),
            })),
            registry: None,
        }
    }

    /// Skips tools that are registered but disabled or circuit-open.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    fn snapshot(&self) -> Arc<RouterState> {
        Arc::clone(&self.state.read().expect("router state poisoned"))
    }

    fn swap(&self, state: RouterState) {
        *self.state.write().expect("router state poisoned") = Arc::new(state);
    }

    /// Returns the current settings.
    ///
    /// # Panics
    ///
    /// Panics if the internal state lock is poisoned.
    #[must_use]
    pub fn settings(&self) -> RoutingSettings {
        self.snapshot().settings.clone()
    }

    /// Replaces the whole pattern set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RoutingError`] when the configuration does not
    /// compile; the current set stays active.
    ///
    /// # Panics
    ///
    /// Panics if the internal state lock is poisoned.
    pub fn reload(&self, config: &RoutingConfig) -> RoutingResult<()> {
        let state = RouterState::compile(config)?;
        info!(
            tools = state.tools.len(),
            patterns = state.pattern_count(),
            "routing patterns reloaded"
        );
        self.swap(state);
        Ok(())
    }

    /// Re-reads a YAML file and replaces the pattern set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RoutingError`] when the file cannot be read or
    /// compiled; the current set stays active.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> RoutingResult<()> {
        let config = RoutingConfig::load(path)?;
        self.reload(&config)
    }

    /// Appends a pattern to a tool, creating the tool entry if needed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RoutingError::InvalidPattern`] when the pattern does
    /// not compile.
    ///
    /// # Panics
    ///
    /// Panics if the internal state lock is poisoned.
    pub fn add_pattern(&self, tool: &str, spec: &PatternSpec) -> RoutingResult<()> {
        let mut guard = self.state.write().expect("router state poisoned");
        let compiled = pattern::compile(tool, spec, guard.settings.case_sensitive)?;
        let mut state = RouterState::clone(&guard);
        match state.tools.iter_mut().find(|set| set.tool == tool) {
            Some(set) => set.patterns.push(compiled),
            None => state.tools.push(ToolPatternSet {
                tool: tool.to_owned(),
                priority: 0,
                patterns: vec![compiled],
            }),
        }
        *guard = Arc::new(state);
        debug!(tool, pattern = %spec.pattern, "routing pattern added");
        Ok(())
    }

    fn available(&self, tool: &str, user: Option<&str>) -> bool {
        let Some(registry) = &self.registry else {
            return true;
        };
        registry.get(tool).is_none_or(|record| {
            record.is_available() && record.config().permits_user(user)
        })
    }

    fn score(&self, state: &RouterState, text: &str, language: &str, user: Option<&str>) -> Vec<Scored> {
        let mut scored: Vec<Scored> = state
            .tools
            .iter()
            .filter(|set| self.available(&set.tool, user))
            .filter_map(|set| score_tool(set, text, language, &state.settings))
            .collect();
        scored.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.tool.cmp(&b.tool))
        });
        scored
    }

    /// Returns every matching tool, best first, without applying the
    /// confidence threshold.
    ///
    /// # Panics
    ///
    /// Panics if the internal state lock is poisoned.
    #[must_use]
    pub fn suggestions(&self, text: &str, limit: usize) -> Vec<Candidate> {
        let state = self.snapshot();
        let language = detect_language(text);
        self.score(&state, text, language, None)
            .iter()
            .take(limit)
            .map(Candidate::from)
            .collect()
    }

    /// Synchronous form of [`CapabilityRouter::route`].
    ///
    /// # Panics
    ///
    /// Panics if the internal state lock is poisoned.
    #[must_use]
    pub fn route_sync(&self, text: &str, context: &RoutingContext) -> ToolMatch {
        let state = self.snapshot();
        let language = context
            .language
            .clone()
            .unwrap_or_else(|| detect_language(text).to_owned());
        let scored = self.score(&state, text, &language, context.user.as_deref());
        let settings = &state.settings;

        match scored.split_first() {
            Some((best, rest)) if best.confidence >= settings.confidence_threshold => {
                debug!(
                    tool = %best.tool,
                    confidence = best.confidence,
                    %language,
                    candidates = scored.len(),
                    "routed by pattern"
                );
                ToolMatch {
                    tool: best.tool.clone(),
                    capability: best.capability.clone(),
                    confidence: best.confidence,
                    matched_patterns: best.matched.clone(),
                    reasoning: None,
                    alternatives: rest.iter().take(MAX_ALTERNATIVES).map(Candidate::from).collect(),
                    language,
                    requires_context: false,
                    fallback: false,
                }
            }
            _ => {
                debug!(
                    best = scored.first().map(|s| s.confidence),
                    threshold = settings.confidence_threshold,
                    %language,
                    "no pattern reached the threshold"
                );
                let mut fallback = ToolMatch::fallback(
                    settings.default_tool.clone(),
                    language,
                    Some("no candidate reached the confidence threshold".to_owned()),
                );
                fallback.alternatives = scored
                    .iter()
                    .take(MAX_ALTERNATIVES)
                    .map(Candidate::from)
                    .collect();
                fallback
            }
        }
    }
}

/// Scores one tool; `None` when none of its patterns match.
fn score_tool(
    set: &ToolPatternSet,
    text: &str,
    language: &str,
    settings: &RoutingSettings,
) -> Option<Scored> {
    let bonus = f64::from(set.priority) * PRIORITY_BONUS;
    let total: f64 = set.patterns.iter().map(|p| p.weight).sum::<f64>() + bonus;
    if total <= 0.0 {
        return None;
    }

    let mut accumulated = 0.0;
    let mut matched = Vec::new();
    let mut hint: Option<(&CompiledPattern, f64)> = None;
    for pattern in set.patterns.iter().filter(|p| p.regex.is_match(text)) {
        let contribution = pattern.weight * language_multiplier(&pattern.language, language, settings);
        accumulated += contribution;
        matched.push(pattern.source.clone());
        if pattern.capability.is_some() && hint.is_none_or(|(_, best)| contribution > best) {
            hint = Some((pattern, contribution));
        }
    }
    if matched.is_empty() {
        return None;
    }

    Some(Scored {
        tool: set.tool.clone(),
        capability: hint.and_then(|(pattern, _)| pattern.capability.clone()),
        confidence: ((accumulated + bonus) / total).clamp(0.0, 1.0),
        priority: set.priority,
        matched,
    })
}

#[async_trait]
impl CapabilityRouter for PatternRouter {
    async fn route(&self, text: &str, context: &RoutingContext) -> ToolMatch {
        self.route_sync(text, context)
    }
}
