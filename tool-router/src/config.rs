//! Routing configuration file.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::ANY_LANGUAGE;

/// Result alias for routing configuration operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised while loading or compiling routing configuration.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The file could not be read.
    #[error("failed to read routing config {}: {source}", path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The YAML was malformed.
    #[error("malformed routing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A pattern failed to compile.
    #[error("invalid pattern `{pattern}` for tool `{tool}`: {reason}")]
    InvalidPattern {
        /// Owning tool.
        tool: String,
        /// Pattern source.
        pattern: String,
        /// Compilation error.
        reason: String,
    },
    /// Settings are out of range.
    #[error("invalid routing settings: {0}")]
    Invalid(String),
}

fn default_weight() -> f64 {
    1.0
}

fn default_language() -> String {
    ANY_LANGUAGE.to_owned()
}

/// One weighted pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Regular expression, optionally written `/body/flags`.
    pub pattern: String,
    /// Contribution of a match.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Language the pattern is written in, or `any`.
    #[serde(default = "default_language")]
    pub language: String,
    /// Capability a match points at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl PatternSpec {
    /// Language-neutral pattern of weight 1.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            weight: default_weight(),
            language: default_language(),
            capability: None,
        }
    }

    /// Sets the weight.
    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Sets the language tag.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Sets the capability hint.
    #[must_use]
    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }
}

/// Patterns and base priority of one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPatterns {
    /// Base priority; contributes `priority * 0.1` to a matching tool.
    #[serde(default)]
    pub priority: u32,
    /// Weighted patterns.
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

fn default_tool() -> String {
    "general".to_owned()
}

fn default_threshold() -> f64 {
    0.3
}

/// Global routing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Tool returned when nothing reaches the threshold.
    #[serde(default = "default_tool")]
    pub default_tool: String,
    /// Minimum confidence for a non-fallback match.
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    /// Multiplier applied to patterns written in the detected language.
    #[serde(default)]
    pub language_weights: BTreeMap<String, f64>,
    /// Match patterns case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_tool: default_tool(),
            confidence_threshold: default_threshold(),
            language_weights: BTreeMap::new(),
            case_sensitive: false,
        }
    }
}

/// Contents of the routing configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Patterns per tool.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolPatterns>,
    /// Global settings.
    #[serde(default)]
    pub settings: RoutingSettings,
}

impl RoutingConfig {
    /// The configuration used when no usable file exists: default tool
    /// `general` and no patterns.
    #[must_use]
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Parses YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Parse`] for malformed YAML and
    /// [`RoutingError::Invalid`] for out-of-range settings.
    pub fn from_yaml_str(yaml: &str) -> RoutingResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Io`] when the file cannot be read, plus any
    /// error from [`Self::from_yaml_str`].
    pub fn load(path: impl AsRef<Path>) -> RoutingResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RoutingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Loads a file, falling back to [`Self::minimal`] with a warning.
    #[must_use]
    pub fn load_or_minimal(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "using minimal routing configuration");
            Self::minimal()
        })
    }

    /// Checks settings and pattern weights.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Invalid`] describing the first problem.
    pub fn validate(&self) -> RoutingResult<()> {
        let settings = &self.settings;
        if settings.default_tool.trim().is_empty() {
            return Err(RoutingError::Invalid("default_tool cannot be empty".into()));
        }
        if !(0.0..=1.0).contains(&settings.confidence_threshold) {
            return Err(RoutingError::Invalid(format!(
                "confidence_threshold {} is outside [0, 1]",
                settings.confidence_threshold
            )));
        }
        if let Some((language, weight)) = settings
            .language_weights
            .iter()
            .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
        {
            return Err(RoutingError::Invalid(format!(
                "language weight {weight} for `{language}` must be a non-negative number"
            )));
        }
        for (tool, patterns) in &self.tools {
            if let Some(spec) = patterns
                .patterns
                .iter()
                .find(|spec| !spec.weight.is_finite() || spec.weight < 0.0)
            {
                return Err(RoutingError::Invalid(format!(
                    "pattern `{}` of tool `{tool}` has invalid weight {}",
                    spec.pattern, spec.weight
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
tools:
  weather:
    priority: 2
    patterns:
      - pattern: '\bweather\b'
        weight: 2.0
        language: en
        capability: get_current
      - pattern: '/\bhava\b/i'
        language: tr
settings:
  default_tool: general
  confidence_threshold: 0.4
  language_weights:
    tr: 1.2
"#;

    #[test]
    fn parses_tools_and_settings() {
        let config = RoutingConfig::from_yaml_str(YAML).unwrap();
        let weather = &config.tools["weather"];
        assert_eq!(weather.priority, 2);
        assert_eq!(weather.patterns.len(), 2);
        assert_eq!(weather.patterns[1].weight, 1.0);
        assert_eq!(weather.patterns[0].capability.as_deref(), Some("get_current"));
        assert_eq!(config.settings.language_weights["tr"], 1.2);
        assert!(!config.settings.case_sensitive);
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let err = RoutingConfig::from_yaml_str("settings:\n  confidence_threshold: 1.5\n")
            .unwrap_err();
        assert!(matches!(err, RoutingError::Invalid(_)));
        assert!(matches!(
            RoutingConfig::from_yaml_str("tools: [1, 2]"),
            Err(RoutingError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_minimal() {
        let config = RoutingConfig::load_or_minimal("/definitely/not/here.yaml");
        assert_eq!(config, RoutingConfig::minimal());
        assert_eq!(config.settings.default_tool, "general");
        assert!(config.tools.is_empty());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routing.yaml");
        std::fs::write(&path, YAML).unwrap();
        assert_eq!(RoutingConfig::load(&path).unwrap().tools.len(), 1);
    }
}
