//! Name-keyed tool registry with per-tool configuration and health locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tool_primitives::{ToolConfiguration, ToolId, ToolKind, ToolMetadata};
use tracing::{debug, info, warn};

use crate::health::{Admission, BreakerConfig, CircuitState, HealthRecord};

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced by the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Metadata or a capability schema failed validation.
    #[error(transparent)]
    Validation(#[from] tool_primitives::Error),
    /// A tool with the same name is already registered.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Conflicting tool name.
        name: String,
    },
    /// No tool is registered under the name.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Requested tool name.
        name: String,
    },
    /// Registry configuration is invalid.
    #[error("invalid registry configuration: {0}")]
    InvalidConfig(&'static str),
}

impl RegistryError {
    fn unknown(name: &str) -> Self {
        Self::UnknownTool { name: name.to_owned() }
    }
}

/// Point-in-time snapshot of a registered tool.
#[derive(Clone, Debug)]
pub struct ToolRecord {
    id: ToolId,
    metadata: Arc<ToolMetadata>,
    config: ToolConfiguration,
    health: HealthRecord,
    registered_at: DateTime<Utc>,
}

impl ToolRecord {
    /// Returns the identifier assigned at registration.
    #[must_use]
    pub const fn id(&self) -> ToolId {
        self.id
    }

    /// Returns the tool metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns a shared handle to the metadata.
    #[must_use]
    pub fn metadata_arc(&self) -> Arc<ToolMetadata> {
        Arc::clone(&self.metadata)
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the configuration snapshot.
    #[must_use]
    pub fn config(&self) -> &ToolConfiguration {
        &self.config
    }

    /// Returns the health snapshot.
    #[must_use]
    pub fn health(&self) -> &HealthRecord {
        &self.health
    }

    /// Returns when the tool was registered.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns `true` when the tool is enabled and its circuit is not open.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.config.is_enabled() && !self.health.is_open()
    }
}

/// Snapshot plus the cancellation token of the registration it came from.
#[derive(Clone, Debug)]
pub struct ToolLease {
    /// Snapshot taken when the lease was granted.
    pub record: ToolRecord,
    /// Cancelled when the tool is unregistered or replaced.
    pub cancel: CancellationToken,
}

/// Filter applied by [`ToolRegistry::list`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToolFilter {
    /// Only tools of this kind.
    pub kind: Option<ToolKind>,
    /// Only tools with this enabled flag.
    pub enabled: Option<bool>,
    /// Only tools in this circuit state.
    pub state: Option<CircuitState>,
    /// Skip tools whose circuit is open.
    pub exclude_open: bool,
}

impl ToolFilter {
    /// Matches every tool.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches enabled tools whose circuit is not open.
    #[must_use]
    pub fn available() -> Self {
        Self {
            enabled: Some(true),
            exclude_open: true,
            ..Self::default()
        }
    }

    /// Restricts the filter to a tool kind.
    #[must_use]
    pub fn with_kind(mut self, kind: ToolKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches(&self, record: &ToolRecord) -> bool {
        if self.kind.is_some_and(|kind| kind != record.metadata.kind()) {
            return false;
        }
        if self
            .enabled
            .is_some_and(|enabled| enabled != record.config.is_enabled())
        {
            return false;
        }
        if self.state.is_some_and(|state| state != record.health.state()) {
            return false;
        }
        !(self.exclude_open && record.health.is_open())
    }
}

struct ToolEntry {
    id: ToolId,
    metadata: Arc<ToolMetadata>,
    config: RwLock<ToolConfiguration>,
    health: Mutex<HealthRecord>,
    registered_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ToolEntry {
    fn snapshot(&self) -> ToolRecord {
        ToolRecord {
            id: self.id,
            metadata: Arc::clone(&self.metadata),
            config: self.config.read().expect("tool config poisoned").clone(),
            health: self.health.lock().expect("tool health poisoned").clone(),
            registered_at: self.registered_at,
        }
    }
}

/// Registry of tools keyed by name.
///
/// The outer map lock is held only long enough to clone an entry handle;
/// configuration and health updates lock the individual entry.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<ToolEntry>>>,
    breaker: BreakerConfig,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools = self.tools.read().expect("tool registry poisoned");
        let mut names: Vec<_> = tools.keys().cloned().collect();
        names.sort();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry with the default breaker configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with a custom breaker configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] when the configuration is
    /// rejected by [`BreakerConfig::validate`].
    pub fn with_breaker(breaker: BreakerConfig) -> RegistryResult<Self> {
        breaker.validate()?;
        Ok(Self {
            tools: RwLock::default(),
            breaker,
        })
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub const fn breaker(&self) -> BreakerConfig {
        self.breaker
    }

    /// Registers a new tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for malformed metadata and
    /// [`RegistryError::DuplicateTool`] when the name is taken.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register(
        &self,
        metadata: ToolMetadata,
        config: ToolConfiguration,
    ) -> RegistryResult<ToolId> {
        self.insert(metadata, config, false)
    }

    /// Registers a tool, replacing any existing entry of the same name.
    ///
    /// The replaced entry's cancellation token fires so its in-flight
    /// executions stop.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for malformed metadata.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_replacing(
        &self,
        metadata: ToolMetadata,
        config: ToolConfiguration,
    ) -> RegistryResult<ToolId> {
        self.insert(metadata, config, true)
    }

    fn insert(
        &self,
        metadata: ToolMetadata,
        config: ToolConfiguration,
        replace: bool,
    ) -> RegistryResult<ToolId> {
        metadata.validate()?;

        let name = metadata.name().to_owned();
        let id = ToolId::random();
        let entry = Arc::new(ToolEntry {
            id,
            metadata: Arc::new(metadata),
            config: RwLock::new(config),
            health: Mutex::new(HealthRecord::default()),
            registered_at: Utc::now(),
            cancel: CancellationToken::new(),
        });

        let previous = {
            let mut tools = self.tools.write().expect("tool registry poisoned");
            if !replace && tools.contains_key(&name) {
                return Err(RegistryError::DuplicateTool { name });
            }
            tools.insert(name.clone(), entry)
        };

        if let Some(previous) = previous {
            previous.cancel.cancel();
            info!(tool = %name, %id, replaced = %previous.id, "tool re-registered");
        } else {
            info!(tool = %name, %id, "tool registered");
        }
        Ok(id)
    }

    fn entry(&self, name: &str) -> Option<Arc<ToolEntry>> {
        let tools = self.tools.read().expect("tool registry poisoned");
        tools.get(name).cloned()
    }

    fn require(&self, name: &str) -> RegistryResult<Arc<ToolEntry>> {
        self.entry(name).ok_or_else(|| RegistryError::unknown(name))
    }

    /// Returns `true` when a tool with the name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Returns a snapshot of the named tool.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolRecord> {
        self.entry(name).map(|entry| entry.snapshot())
    }

    /// Returns a snapshot together with the registration's cancellation token.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn lease(&self, name: &str) -> Option<ToolLease> {
        self.entry(name).map(|entry| ToolLease {
            record: entry.snapshot(),
            cancel: entry.cancel.clone(),
        })
    }

    /// Lists tools matching the filter, ordered by name.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn list(&self, filter: ToolFilter) -> Vec<ToolRecord> {
        let entries: Vec<Arc<ToolEntry>> = {
            let tools = self.tools.read().expect("tool registry poisoned");
            tools.values().cloned().collect()
        };
        let mut records: Vec<ToolRecord> = entries
            .iter()
            .map(|entry| entry.snapshot())
            .filter(|record| filter.matches(record))
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        records
    }

    /// Returns the number of registered tools.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry poisoned").len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enables or disables a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> RegistryResult<()> {
        let entry = self.require(name)?;
        entry
            .config
            .write()
            .expect("tool config poisoned")
            .set_enabled(enabled);
        info!(tool = name, enabled, "tool enabled flag updated");
        Ok(())
    }

    /// Replaces the configuration of a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn update_config(&self, name: &str, config: ToolConfiguration) -> RegistryResult<()> {
        let entry = self.require(name)?;
        *entry.config.write().expect("tool config poisoned") = config;
        debug!(tool = name, "tool configuration replaced");
        Ok(())
    }

    /// Removes a tool and cancels its in-flight executions.
    ///
    /// Returns `false` when no tool was registered under the name.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .tools
            .write()
            .expect("tool registry poisoned")
            .remove(name);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!(tool = name, id = %entry.id, "tool unregistered");
                true
            }
            None => false,
        }
    }

    /// Asks the circuit breaker whether a request may reach the tool now.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    pub fn admit(&self, name: &str) -> RegistryResult<Admission> {
        self.admit_at(name, Utc::now())
    }

    /// [`Self::admit`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn admit_at(&self, name: &str, now: DateTime<Utc>) -> RegistryResult<Admission> {
        let entry = self.require(name)?;
        let mut health = entry.health.lock().expect("tool health poisoned");
        let before = health.state();
        let admission = health.admit(now, self.breaker);
        if before == CircuitState::HalfOpen && health.is_open() {
            warn!(
                tool = name,
                retry_at = ?health.next_retry_at(),
                "probe expired without an outcome; circuit reopened"
            );
        }
        debug!(tool = name, ?admission, "admission decided");
        Ok(admission)
    }

    /// Frees the half-open slot taken by a probe that will never report,
    /// so the next request may probe instead. Ignored when `id` no longer
    /// names the registered generation of the tool.
    ///
    /// Returns `true` when a probe was released.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn release_probe(&self, name: &str, id: ToolId) -> bool {
        let Some(entry) = self.entry(name).filter(|entry| entry.id == id) else {
            return false;
        };
        let released = entry
            .health
            .lock()
            .expect("tool health poisoned")
            .release_probe();
        if released {
            debug!(tool = name, "probe released without an outcome");
        }
        released
    }

    /// Feeds an execution outcome into the tool's circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    pub fn report_outcome(&self, name: &str, success: bool) -> RegistryResult<HealthRecord> {
        self.report_outcome_at(name, success, Utc::now())
    }

    /// [`Self::report_outcome`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn report_outcome_at(
        &self,
        name: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> RegistryResult<HealthRecord> {
        let entry = self.require(name)?;
        let mut health = entry.health.lock().expect("tool health poisoned");
        let before = health.state();
        health.record(success, now, self.breaker);
        let after = health.state();

        if before != after {
            match after {
                CircuitState::Open => warn!(
                    tool = name,
                    failures = health.consecutive_failures(),
                    retry_at = ?health.next_retry_at(),
                    "circuit opened"
                ),
                CircuitState::Closed => info!(tool = name, "circuit closed"),
                CircuitState::HalfOpen => {}
            }
        }
        Ok(health.clone())
    }

    /// Closes a tool's circuit and clears its failure history.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not registered.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn reset_health(&self, name: &str) -> RegistryResult<()> {
        let entry = self.require(name)?;
        *entry.health.lock().expect("tool health poisoned") = HealthRecord::default();
        info!(tool = name, "tool health reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::time::Duration;

    use chrono::TimeDelta;
    use serde_json::json;
    use tool_primitives::{ParamType, ParameterSpec, PluginKind, ToolCapability};

    use super::*;

    fn weather() -> ToolMetadata {
        ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .description("Weather lookups")
            .capability(
                ToolCapability::builder("get_current")
                    .description("Current conditions")
                    .input(ParameterSpec::new("location", ParamType::String).required())
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_breaker(BreakerConfig::new(
            NonZeroU32::new(2).unwrap(),
            Duration::from_secs(10),
            Duration::from_secs(60),
        ))
        .unwrap()
    }

    #[test]
    fn register_then_get_returns_equal_metadata() {
        let registry = ToolRegistry::new();
        let metadata = weather();
        let id = registry
            .register(metadata.clone(), ToolConfiguration::new())
            .unwrap();

        let record = registry.get("weather").expect("registered");
        assert_eq!(record.id(), id);
        assert_eq!(record.metadata(), &metadata);
        assert_eq!(record.health().state(), CircuitState::Closed);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = ToolRegistry::new();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        let err = registry
            .register(weather(), ToolConfiguration::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn malformed_schema_fails_fast() {
        let metadata: ToolMetadata = serde_json::from_value(json!({
            "name": "weather",
            "version": "1.0.0",
            "kind": "internal",
            "capabilities": [{
                "name": "get_current",
                "input_schema": [{"name": "days", "type": "integer", "default": "x"}]
            }]
        }))
        .unwrap();

        let registry = ToolRegistry::new();
        let err = registry
            .register(metadata, ToolConfiguration::new())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn replacing_cancels_previous_lease() {
        let registry = ToolRegistry::new();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        let lease = registry.lease("weather").unwrap();

        registry
            .register_replacing(weather(), ToolConfiguration::new())
            .unwrap();
        assert!(lease.cancel.is_cancelled());
        assert!(!registry.lease("weather").unwrap().cancel.is_cancelled());
    }

    #[test]
    fn unregister_cancels_token() {
        let registry = ToolRegistry::new();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        let lease = registry.lease("weather").unwrap();

        assert!(registry.unregister("weather"));
        assert!(lease.cancel.is_cancelled());
        assert!(registry.get("weather").is_none());
        assert!(!registry.unregister("weather"));
    }

    #[test]
    fn list_filters_by_kind_enabled_and_state() {
        let registry = registry();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        let plugin = ToolMetadata::builder("translator", ToolKind::Plugin(PluginKind::HttpApi))
            .version("0.1.0")
            .unwrap()
            .build()
            .unwrap();
        registry.register(plugin, ToolConfiguration::new()).unwrap();

        let plugins = registry.list(ToolFilter::all().with_kind(ToolKind::Plugin(PluginKind::HttpApi)));
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "translator");

        registry.set_enabled("translator", false).unwrap();
        let names: Vec<_> = registry
            .list(ToolFilter::available())
            .into_iter()
            .map(|record| record.name().to_owned())
            .collect();
        assert_eq!(names, ["weather"]);

        registry.report_outcome("weather", false).unwrap();
        registry.report_outcome("weather", false).unwrap();
        assert!(registry.list(ToolFilter::available()).is_empty());

        let open = registry.list(ToolFilter {
            state: Some(CircuitState::Open),
            ..ToolFilter::default()
        });
        assert_eq!(open.len(), 1);
    }

    #[test]
    fn breaker_cycle_through_registry() {
        let registry = registry();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        let now = Utc::now();

        registry.report_outcome_at("weather", false, now).unwrap();
        let health = registry.report_outcome_at("weather", false, now).unwrap();
        assert_eq!(health.state(), CircuitState::Open);

        assert!(!registry.admit_at("weather", now).unwrap().is_admitted());
        let later = now + TimeDelta::seconds(10);
        assert_eq!(registry.admit_at("weather", later).unwrap(), Admission::Probe);
        assert!(!registry.admit_at("weather", later).unwrap().is_admitted());

        let health = registry.report_outcome_at("weather", true, later).unwrap();
        assert_eq!(health.state(), CircuitState::Closed);
        assert_eq!(health.consecutive_failures(), 0);
    }

    #[test]
    fn release_probe_only_touches_its_own_generation() {
        let registry = registry();
        let id = registry.register(weather(), ToolConfiguration::new()).unwrap();
        let now = Utc::now();
        registry.report_outcome_at("weather", false, now).unwrap();
        registry.report_outcome_at("weather", false, now).unwrap();

        let later = now + TimeDelta::seconds(10);
        assert_eq!(registry.admit_at("weather", later).unwrap(), Admission::Probe);
        assert!(!registry.release_probe("weather", ToolId::random()));
        assert!(!registry.admit_at("weather", later).unwrap().is_admitted());

        assert!(registry.release_probe("weather", id));
        assert_eq!(registry.admit_at("weather", later).unwrap(), Admission::Probe);
    }

    #[test]
    fn reset_health_closes_circuit() {
        let registry = registry();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        registry.report_outcome("weather", false).unwrap();
        registry.report_outcome("weather", false).unwrap();
        registry.reset_health("weather").unwrap();
        assert_eq!(registry.admit("weather").unwrap(), Admission::Allowed);
    }

    #[test]
    fn config_updates_visible_in_next_snapshot() {
        let registry = ToolRegistry::new();
        registry.register(weather(), ToolConfiguration::new()).unwrap();
        let before = registry.get("weather").unwrap();

        registry
            .update_config(
                "weather",
                ToolConfiguration::new().with_setting("provider", "weather"),
            )
            .unwrap();
        assert!(before.config().setting("provider").is_none());
        assert_eq!(
            registry.get("weather").unwrap().config().setting_str("provider"),
            Some("weather")
        );
        assert!(matches!(
            registry.set_enabled("missing", true),
            Err(RegistryError::UnknownTool { .. })
        ));
    }
}
