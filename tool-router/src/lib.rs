//! Maps natural-language requests onto registered tools.
//!
//! Two strategies implement [`CapabilityRouter`]: [`PatternRouter`] scores
//! weighted regular expressions loaded from a YAML file, and
//! [`DelegatedRouter`] asks a language model to choose. Neither fails; when no
//! candidate is good enough they return the configured default tool with
//! [`ToolMatch::is_fallback`] set.

#![warn(missing_docs, clippy::pedantic)]

mod config;
mod delegated;
mod language;
mod pattern;
mod pattern_router;
mod types;

pub use config::{PatternSpec, RoutingConfig, RoutingError, RoutingResult, RoutingSettings, ToolPatterns};
pub use delegated::{DelegatedRouter, EvaluationError};
pub use language::detect_language;
pub use pattern_router::PatternRouter;
pub use types::{
    ANY_LANGUAGE, CapabilityRouter, Candidate, FALLBACK_CONFIDENCE, RoutingContext, ToolMatch,
};
