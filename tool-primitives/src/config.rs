//! Per-tool runtime configuration.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known keys inside [`ToolConfiguration::settings`].
pub mod settings {
    /// Provider factory key for internal and native-module tools.
    pub const PROVIDER: &str = "provider";
    /// Module key used by native-module plugins (alias of [`PROVIDER`]).
    pub const MODULE: &str = "module";
    /// Executable to spawn for executable plugins.
    pub const COMMAND: &str = "command";
    /// Arguments passed to [`COMMAND`] or [`SERVER_COMMAND`].
    pub const ARGS: &str = "args";
    /// Working directory for spawned processes.
    pub const WORKING_DIR: &str = "working_dir";
    /// Base URL for HTTP-backed tools.
    pub const BASE_URL: &str = "base_url";
    /// Path template appended to [`BASE_URL`]; `{capability}` is substituted.
    pub const ENDPOINT: &str = "endpoint";
    /// Extra HTTP headers as a string map.
    pub const HEADERS: &str = "headers";
    /// Command line of a remote tool server speaking JSON over stdio.
    pub const SERVER_COMMAND: &str = "server_command";
}

/// Resource limits applied to a tool's executions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Advisory memory ceiling exported to child processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,
    /// Hard wall-clock limit for a single execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_secs: Option<u64>,
    /// Maximum number of concurrent executions; unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<NonZeroUsize>,
    /// Number of callers allowed to wait for a concurrency slot.
    #[serde(default)]
    pub max_queue_depth: usize,
}

impl ResourceLimits {
    /// Returns the execution time limit as a [`Duration`].
    #[must_use]
    pub fn max_execution_time(&self) -> Option<Duration> {
        self.max_execution_secs.map(Duration::from_secs)
    }
}

/// Mutable runtime configuration attached to a registered tool.
///
/// Changes take effect on the next execution; in-flight executions keep the
/// snapshot they started with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolConfiguration {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    settings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(default)]
    limits: ResourceLimits,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    allowed_users: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ToolConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: BTreeMap::new(),
            env: BTreeMap::new(),
            limits: ResourceLimits::default(),
            allowed_users: Vec::new(),
        }
    }
}

impl ToolConfiguration {
    /// Creates an enabled configuration with no settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a configuration value.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Sets an environment variable for spawned processes.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replaces the resource limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Restricts the tool to the supplied user identifiers.
    #[must_use]
    pub fn with_allowed_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_users = users.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the enabled flag.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Updates the enabled flag in place.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns all settings.
    #[must_use]
    pub fn settings(&self) -> &BTreeMap<String, Value> {
        &self.settings
    }

    /// Returns a single setting.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Returns a string setting.
    #[must_use]
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    /// Inserts or replaces a setting in place.
    pub fn insert_setting(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Returns environment variables.
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns resource limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Returns the user allow-list; empty means every user may call the tool.
    #[must_use]
    pub fn allowed_users(&self) -> &[String] {
        &self.allowed_users
    }

    /// Returns `true` when `user` may call the tool.
    #[must_use]
    pub fn permits_user(&self, user: Option<&str>) -> bool {
        if self.allowed_users.is_empty() {
            return true;
        }
        user.is_some_and(|user| self.allowed_users.iter().any(|allowed| allowed == user))
    }
}
