//! Strongly typed configuration sections.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tool_primitives::{ToolConfiguration, ToolMetadata};

use crate::error::{ConfigError, ConfigResult};

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-field default layout.
    #[default]
    Full,
    /// Single-line compact layout.
    Compact,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `tool_router=debug,info`.
    pub level: String,
    /// Output layout.
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Full,
        }
    }
}

/// `[breaker]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSection {
    /// Consecutive failures that open a circuit.
    pub failure_threshold: u32,
    /// First cooldown once a circuit opens.
    pub cooldown_secs: u64,
    /// Ceiling for the doubling cooldown.
    pub max_cooldown_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
            max_cooldown_secs: 300,
        }
    }
}

impl BreakerSection {
    /// Cooldown as a [`Duration`].
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Maximum cooldown as a [`Duration`].
    #[must_use]
    pub const fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }
}

/// `[execution]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionSection {
    /// Timeout applied when neither the request nor the tool sets one.
    pub default_timeout_secs: u64,
    /// Largest accepted output of a process or HTTP backend.
    pub max_output_bytes: usize,
    /// NDJSON journal; no journal when absent.
    pub journal_path: Option<PathBuf>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_output_bytes: 1024 * 1024,
            journal_path: None,
        }
    }
}

impl ExecutionSection {
    /// Default timeout as a [`Duration`].
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// `[loader]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderSection {
    /// Root of the installed plugin working copies.
    pub plugins_dir: PathBuf,
    /// Durable archive store; defaults to `<plugins_dir>/.archives`.
    pub blob_dir: Option<PathBuf>,
    /// Extraction scratch space; the system temp dir when absent.
    pub scratch_dir: Option<PathBuf>,
    /// Largest accepted upload.
    pub max_archive_bytes: u64,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("plugins"),
            blob_dir: None,
            scratch_dir: None,
            max_archive_bytes: 50 * 1024 * 1024,
        }
    }
}

impl LoaderSection {
    /// Blob directory with the default applied.
    #[must_use]
    pub fn blob_dir(&self) -> PathBuf {
        self.blob_dir
            .clone()
            .unwrap_or_else(|| self.plugins_dir.join(".archives"))
    }
}

/// Which router the runtime builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Weighted regular expressions.
    #[default]
    Pattern,
    /// A language model chooses.
    Delegated,
}

/// `[routing]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingSection {
    /// Strategy to build.
    pub strategy: RoutingStrategy,
    /// YAML routing table for the pattern strategy.
    pub config_path: Option<PathBuf>,
    /// Outbound call budget of the delegated strategy.
    pub delegated_timeout_secs: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::Pattern,
            config_path: None,
            delegated_timeout_secs: 10,
        }
    }
}

impl RoutingSection {
    /// Delegated call budget as a [`Duration`].
    #[must_use]
    pub const fn delegated_timeout(&self) -> Duration {
        Duration::from_secs(self.delegated_timeout_secs)
    }
}

/// One `[[tools]]` entry registered at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Tool descriptor.
    #[serde(flatten)]
    pub metadata: ToolMetadata,
    /// Runtime configuration.
    #[serde(default)]
    pub config: ToolConfiguration,
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// `[logging]`
    pub logging: LoggingSection,
    /// `[breaker]`
    pub breaker: BreakerSection,
    /// `[execution]`
    pub execution: ExecutionSection,
    /// `[loader]`
    pub loader: LoaderSection,
    /// `[routing]`
    pub routing: RoutingSection,
    /// `[[tools]]`
    pub tools: Vec<ToolEntry>,
}

impl RuntimeConfig {
    /// Checks cross-field constraints the parser cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level cannot be empty"));
        }
        let breaker = &self.breaker;
        if breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid("breaker.failure_threshold must be at least 1"));
        }
        if breaker.cooldown_secs == 0 {
            return Err(ConfigError::invalid("breaker.cooldown_secs must be greater than zero"));
        }
        if breaker.cooldown_secs > breaker.max_cooldown_secs {
            return Err(ConfigError::invalid(
                "breaker.cooldown_secs cannot exceed breaker.max_cooldown_secs",
            ));
        }
        if self.execution.default_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "execution.default_timeout_secs must be greater than zero",
            ));
        }
        if self.execution.max_output_bytes == 0 {
            return Err(ConfigError::invalid("execution.max_output_bytes must be greater than zero"));
        }
        if self.loader.max_archive_bytes == 0 {
            return Err(ConfigError::invalid("loader.max_archive_bytes must be greater than zero"));
        }
        if self.routing.delegated_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "routing.delegated_timeout_secs must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.tools {
            let name = entry.metadata.name();
            entry
                .metadata
                .validate()
                .map_err(|err| ConfigError::invalid(format!("tool `{name}`: {err}")))?;
            if !seen.insert(name) {
                return Err(ConfigError::invalid(format!("tool `{name}` is declared twice")));
            }
        }
        Ok(())
    }
}
