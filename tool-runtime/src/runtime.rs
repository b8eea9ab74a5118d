//! The process-wide runtime object.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tool_adapters::ModelAdapter;
use tool_config::{ConfigError, RoutingStrategy, RuntimeConfig};
use tool_executor::{
    CallerIdentity, ExecutionConfig, ExecutionJournal, ExecutionRequest, ExecutionResult,
    ExecutionService, FileJournal, ProviderRegistry, ToolExecutor, ValueMap,
};
use tool_loader::{ArchiveLimits, BlobStore, FsBlobStore, LoaderConfig, PluginLoader, PluginOverrides};
use tool_primitives::{PluginId, ToolConfiguration, ToolId, ToolMetadata};
use tool_projector::{
    CapabilityProjector, INTERNAL_ERROR, Projection, ProjectionFormat, ProtocolHandler, RpcError,
    RpcRequest, RpcResponse, ValidationIssue, validate_call,
};
use tool_registry::{BreakerConfig, ToolRegistry};
use tool_router::{
    CapabilityRouter, DelegatedRouter, PatternRouter, RoutingConfig, RoutingContext, ToolMatch,
};
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::lifecycle::{Lifecycle, LifecycleEvent, RuntimeState};

/// Counts executions in flight so shutdown can wait for them.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self)
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Assembles a [`ToolRuntime`] from a [`RuntimeConfig`].
pub struct ToolRuntimeBuilder {
    config: RuntimeConfig,
    adapter: Option<Arc<dyn ModelAdapter>>,
    providers: Option<Arc<ProviderRegistry>>,
    blobs: Option<Arc<dyn BlobStore>>,
    journal: Option<Arc<dyn ExecutionJournal>>,
    routing: Option<RoutingConfig>,
    tracing: bool,
}

impl std::fmt::Debug for ToolRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRuntimeBuilder")
            .field("config", &self.config)
            .field("adapter", &self.adapter.as_ref().map(|a| a.metadata().provider()))
            .field("routing", &self.routing.is_some())
            .field("tracing", &self.tracing)
            .finish_non_exhaustive()
    }
}

impl ToolRuntimeBuilder {
    /// Model adapter used by delegated routing.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn ModelAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Provider factories for in-process tools. Defaults to the
    /// link-time registrations.
    #[must_use]
    pub fn providers(mut self, providers: Arc<ProviderRegistry>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Archive store. Defaults to a filesystem store at the configured
    /// blob directory.
    #[must_use]
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Execution journal, overriding `execution.journal_path`.
    #[must_use]
    pub fn journal(mut self, journal: Arc<dyn ExecutionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// In-memory routing table, overriding `routing.config_path`.
    #[must_use]
    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Installs the global tracing subscriber from `[logging]` on build.
    #[must_use]
    pub const fn with_tracing(mut self) -> Self {
        self.tracing = true;
        self
    }

    /// Builds every component. The runtime starts in
    /// [`RuntimeState::Init`]; call [`ToolRuntime::start`] next.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] for invalid configuration,
    /// [`RuntimeError::Journal`] when the journal cannot be opened,
    /// [`RuntimeError::Routing`] for an invalid in-memory routing table, and
    /// [`RuntimeError::MissingAdapter`] for delegated routing without an
    /// adapter.
    pub async fn build(self) -> RuntimeResult<ToolRuntime> {
        let config = self.config;
        config.validate()?;
        if self.tracing {
            tool_telemetry::init_tracing(&config.logging);
        }

        let threshold = NonZeroU32::new(config.breaker.failure_threshold).ok_or_else(|| {
            ConfigError::Invalid("breaker.failure_threshold must be at least 1".into())
        })?;
        let breaker = BreakerConfig::new(
            threshold,
            config.breaker.cooldown(),
            config.breaker.max_cooldown(),
        );
        let registry = Arc::new(ToolRegistry::with_breaker(breaker)?);

        let providers = self
            .providers
            .unwrap_or_else(|| Arc::new(ProviderRegistry::with_submitted()));
        let journal = match (self.journal, &config.execution.journal_path) {
            (Some(journal), _) => Some(journal),
            (None, Some(path)) => {
                Some(Arc::new(FileJournal::open(path).await?) as Arc<dyn ExecutionJournal>)
            }
            (None, None) => None,
        };
        let mut executor = ExecutionService::new(Arc::clone(&registry), providers).with_config(
            ExecutionConfig::new(
                config.execution.default_timeout(),
                config.execution.max_output_bytes,
            ),
        );
        if let Some(journal) = journal {
            executor = executor.with_journal(journal);
        }
        let executor = Arc::new(executor);

        let blobs = self
            .blobs
            .unwrap_or_else(|| Arc::new(FsBlobStore::new(config.loader.blob_dir())));
        let mut loader_config = LoaderConfig::new(&config.loader.plugins_dir).with_limits(ArchiveLimits {
            max_archive_bytes: config.loader.max_archive_bytes,
            ..ArchiveLimits::default()
        });
        if let Some(scratch) = &config.loader.scratch_dir {
            loader_config = loader_config.with_scratch_dir(scratch);
        }
        let loader = PluginLoader::new(Arc::clone(&registry), blobs, loader_config);

        let table = match self.routing {
            Some(table) => Some(table),
            None => config
                .routing
                .config_path
                .as_ref()
                .map(RoutingConfig::load_or_minimal),
        };
        let (router, patterns): (Arc<dyn CapabilityRouter>, Option<Arc<PatternRouter>>) =
            match config.routing.strategy {
                RoutingStrategy::Pattern => {
                    let patterns = match &table {
                        Some(table) => PatternRouter::new(table)?,
                        None => PatternRouter::minimal(),
                    };
                    let patterns = Arc::new(patterns.with_registry(Arc::clone(&registry)));
                    (patterns.clone() as Arc<dyn CapabilityRouter>, Some(patterns))
                }
                RoutingStrategy::Delegated => {
                    let adapter = self.adapter.ok_or(RuntimeError::MissingAdapter)?;
                    let default_tool = table
                        .map(|table| table.settings.default_tool)
                        .unwrap_or_else(|| RoutingConfig::minimal().settings.default_tool);
                    let delegated = DelegatedRouter::new(adapter, Arc::clone(&registry))
                        .with_default_tool(default_tool)
                        .with_timeout(config.routing.delegated_timeout());
                    (Arc::new(delegated) as Arc<dyn CapabilityRouter>, None)
                }
            };

        let projector = CapabilityProjector::new(Arc::clone(&registry));
        let protocol = ProtocolHandler::new(
            projector.clone(),
            Arc::clone(&executor) as Arc<dyn ToolExecutor>,
        );

        Ok(ToolRuntime {
            config,
            lifecycle: Mutex::new(Lifecycle::new()),
            inflight: InFlight::default(),
            registry,
            executor,
            loader,
            router,
            patterns,
            projector,
            protocol,
        })
    }
}

/// Owns every component and the lifecycle that gates them.
///
/// Construct once at startup, [`start`](Self::start), and
/// [`shutdown`](Self::shutdown) once at exit.
pub struct ToolRuntime {
    config: RuntimeConfig,
    lifecycle: Mutex<Lifecycle>,
    inflight: InFlight,
    registry: Arc<ToolRegistry>,
    executor: Arc<ExecutionService>,
    loader: PluginLoader,
    router: Arc<dyn CapabilityRouter>,
    patterns: Option<Arc<PatternRouter>>,
    projector: CapabilityProjector,
    protocol: ProtocolHandler,
}

impl std::fmt::Debug for ToolRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRuntime")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("strategy", &self.config.routing.strategy)
            .finish_non_exhaustive()
    }
}

impl ToolRuntime {
    /// Starts assembling a runtime from `config`.
    #[must_use]
    pub fn builder(config: RuntimeConfig) -> ToolRuntimeBuilder {
        ToolRuntimeBuilder {
            config,
            adapter: None,
            providers: None,
            blobs: None,
            journal: None,
            routing: None,
            tracing: false,
        }
    }

    /// Loads the TOML configuration at `path` (defaults when missing) and
    /// starts a builder with tracing enabled.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] when the file is unreadable or
    /// invalid.
    pub fn from_config_file(path: Option<&Path>) -> RuntimeResult<ToolRuntimeBuilder> {
        Ok(Self::builder(RuntimeConfig::load(path)?).with_tracing())
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current lifecycle state.
    ///
    /// # Panics
    ///
    /// Panics if the lifecycle lock is poisoned.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.lifecycle.lock().expect("runtime lifecycle poisoned").state()
    }

    fn transition(&self, event: LifecycleEvent) -> RuntimeResult<RuntimeState> {
        Ok(self
            .lifecycle
            .lock()
            .expect("runtime lifecycle poisoned")
            .transition(event)?)
    }

    fn ensure_running(&self) -> RuntimeResult<()> {
        let state = self.state();
        if state.is_running() {
            Ok(())
        } else {
            Err(RuntimeError::NotRunning(state))
        }
    }

    /// Registers the `[[tools]]` bootstrap entries and begins accepting work.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Lifecycle`] unless the runtime is in
    /// [`RuntimeState::Init`], and [`RuntimeError::Registry`] when a
    /// bootstrap entry cannot be registered. A failed start aborts the
    /// runtime.
    ///
    /// # Panics
    ///
    /// Panics if the lifecycle lock is poisoned.
    pub fn start(&self) -> RuntimeResult<()> {
        let state = self.state();
        if state != RuntimeState::Init {
            return Err(crate::LifecycleError::InvalidTransition {
                from: state,
                event: LifecycleEvent::Boot,
            }
            .into());
        }
        for entry in &self.config.tools {
            if let Err(err) = self.registry.register(entry.metadata.clone(), entry.config.clone()) {
                warn!(tool = entry.metadata.name(), %err, "bootstrap registration failed");
                self.transition(LifecycleEvent::Abort)?;
                return Err(err.into());
            }
        }
        self.transition(LifecycleEvent::Boot)?;
        self.transition(LifecycleEvent::Start)?;
        info!(
            tools = self.registry.len(),
            strategy = ?self.config.routing.strategy,
            "tool runtime started"
        );
        Ok(())
    }

    /// Refuses new work, waits up to `grace` for in-flight executions, and
    /// stops. Calling it on a stopped runtime does nothing.
    ///
    /// Returns the number of executions still running when `grace` ran out.
    ///
    /// # Errors
    ///
    /// Only lifecycle errors, which cannot occur from a reachable state.
    pub async fn shutdown(&self, grace: Duration) -> RuntimeResult<usize> {
        match self.state() {
            RuntimeState::Stopped => return Ok(0),
            RuntimeState::Init => {
                self.transition(LifecycleEvent::Abort)?;
                return Ok(0);
            }
            RuntimeState::Ready | RuntimeState::Running => {
                self.transition(LifecycleEvent::Drain)?;
            }
            RuntimeState::Draining => {}
        }

        let abandoned = if tokio::time::timeout(grace, self.inflight.wait_idle())
            .await
            .is_ok()
        {
            0
        } else {
            let remaining = self.inflight.count.load(Ordering::SeqCst);
            warn!(remaining, "shutdown grace elapsed with executions in flight");
            remaining
        };
        self.transition(LifecycleEvent::Stop)?;
        info!("tool runtime stopped");
        Ok(abandoned)
    }

    /// Shared tool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execution service.
    #[must_use]
    pub fn executor(&self) -> &Arc<ExecutionService> {
        &self.executor
    }

    /// Plugin loader.
    #[must_use]
    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// Active router.
    #[must_use]
    pub fn router(&self) -> &Arc<dyn CapabilityRouter> {
        &self.router
    }

    /// Pattern router, when that strategy is active.
    #[must_use]
    pub fn pattern_router(&self) -> Option<&Arc<PatternRouter>> {
        self.patterns.as_ref()
    }

    /// Capability projector.
    #[must_use]
    pub fn projector(&self) -> &CapabilityProjector {
        &self.projector
    }

    /// JSON-RPC protocol handler.
    #[must_use]
    pub fn protocol(&self) -> &ProtocolHandler {
        &self.protocol
    }

    /// Registers a tool directly.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Registry`] for invalid metadata or a
    /// duplicate name.
    pub fn register_tool(
        &self,
        metadata: ToolMetadata,
        config: ToolConfiguration,
    ) -> RuntimeResult<ToolId> {
        Ok(self.registry.register(metadata, config)?)
    }

    /// Removes a tool and its per-tool execution state. In-flight executions
    /// end as cancelled.
    pub fn unregister_tool(&self, name: &str) -> bool {
        let id = self.registry.get(name).map(|record| record.id());
        let removed = self.registry.unregister(name);
        if let Some(id) = id.filter(|_| removed) {
            self.executor.forget(id);
        }
        removed
    }

    /// Enables or disables a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Registry`] for an unknown tool.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> RuntimeResult<()> {
        Ok(self.registry.set_enabled(name, enabled)?)
    }

    /// Routes `text` to a tool. Never fails once running; unmatched text
    /// yields the fallback tool.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotRunning`] outside [`RuntimeState::Running`].
    pub async fn route(&self, text: &str, context: &RoutingContext) -> RuntimeResult<ToolMatch> {
        self.ensure_running()?;
        Ok(self.router.route(text, context).await)
    }

    /// Executes a request.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotRunning`] outside [`RuntimeState::Running`].
    /// Execution failures are reported inside the [`ExecutionResult`].
    pub async fn execute(&self, request: ExecutionRequest) -> RuntimeResult<ExecutionResult> {
        self.ensure_running()?;
        let _guard = self.inflight.enter();
        Ok(self.executor.execute(request).await)
    }

    /// Projects the capabilities `caller` may use into `format`.
    #[must_use]
    pub fn project(&self, format: ProjectionFormat, caller: &CallerIdentity) -> Projection {
        self.projector.project_for(format, caller)
    }

    /// Validates a call without executing it.
    #[must_use]
    pub fn validate_call(&self, tool: &str, capability: &str, input: &ValueMap) -> Vec<ValidationIssue> {
        validate_call(&self.registry, tool, capability, input)
    }

    /// Serves one JSON-RPC request. Outside [`RuntimeState::Running`] every
    /// request fails with an internal error.
    pub async fn handle_rpc(&self, request: RpcRequest, caller: &CallerIdentity) -> RpcResponse {
        if let Err(err) = self.ensure_running() {
            return RpcResponse::failure(request.id, RpcError::new(INTERNAL_ERROR, err.to_string()));
        }
        let _guard = self.inflight.enter();
        self.protocol.handle_request(request, caller).await
    }

    /// Uploads a plugin archive, replacing a previously uploaded plugin of
    /// the same name.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotRunning`] or [`RuntimeError::Loader`];
    /// [`RuntimeError::kind`] tells validation, security, and load failures
    /// apart.
    pub async fn upload_plugin(
        &self,
        archive: Bytes,
        name: &str,
        overrides: Option<PluginOverrides>,
    ) -> RuntimeResult<(PluginId, String)> {
        self.ensure_running()?;
        let previous = self.registry.get(name).map(|record| record.id());
        let uploaded = self.loader.upload(archive, name, overrides).await?;
        let current = self.registry.get(name).map(|record| record.id());
        if let Some(previous) = previous.filter(|id| Some(*id) != current) {
            self.executor.forget(previous);
        }
        Ok(uploaded)
    }

    /// Deletes an uploaded plugin.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotRunning`] or [`RuntimeError::Loader`].
    pub async fn delete_plugin(&self, name: &str) -> RuntimeResult<()> {
        self.ensure_running()?;
        let id = self.registry.get(name).map(|record| record.id());
        self.loader.delete(name).await?;
        if let Some(id) = id {
            self.executor.forget(id);
        }
        Ok(())
    }

    /// Re-extracts and re-scans an uploaded plugin.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotRunning`] or [`RuntimeError::Loader`].
    pub async fn reload_plugin(&self, name: &str) -> RuntimeResult<String> {
        self.ensure_running()?;
        Ok(self.loader.reload(name).await?)
    }

    /// Re-reads `routing.config_path` into the pattern router.
    ///
    /// Returns `false` when there is nothing to reload: delegated routing or
    /// no configured path.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Routing`] when the file cannot be read or
    /// compiled; the previous table stays active.
    pub fn reload_routing(&self) -> RuntimeResult<bool> {
        let (Some(patterns), Some(path)) = (&self.patterns, &self.config.routing.config_path) else {
            return Ok(false);
        };
        patterns.reload_from(path)?;
        info!(path = %path.display(), "routing table reloaded");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tool_config::ToolEntry;
    use tool_executor::{ErrorKind, Invocation, MemoryJournal, ProviderError};
    use tool_loader::MemoryBlobStore;
    use tool_primitives::{ParamType, ParameterSpec, ToolCapability, ToolKind, settings};

    use super::*;

    fn echo_entry() -> ToolEntry {
        ToolEntry {
            metadata: ToolMetadata::builder("echo", ToolKind::Internal)
                .version("1.0.0")
                .unwrap()
                .capability(
                    ToolCapability::builder("say")
                        .input(ParameterSpec::new("text", ParamType::String).required())
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
            config: ToolConfiguration::new().with_setting(settings::PROVIDER, "echo"),
        }
    }

    async fn runtime(config: RuntimeConfig) -> ToolRuntime {
        let providers = Arc::new(ProviderRegistry::new());
        providers
            .register_provider(
                "echo",
                Arc::new(|invocation: Invocation| async move {
                    Ok::<_, ProviderError>(json!(invocation.input))
                }),
            )
            .unwrap();
        ToolRuntime::builder(config)
            .providers(providers)
            .blobs(Arc::new(MemoryBlobStore::new()))
            .journal(Arc::new(MemoryJournal::new()))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn work_is_refused_until_started() {
        let runtime = runtime(RuntimeConfig::default()).await;
        assert_eq!(runtime.state(), RuntimeState::Init);
        let err = runtime
            .route("hello", &RoutingContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NotRunning(RuntimeState::Init)));
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);

        runtime.start().unwrap();
        assert!(runtime.state().is_running());
        assert!(runtime.start().is_err());
        let matched = runtime.route("hello", &RoutingContext::new()).await.unwrap();
        assert!(matched.is_fallback());
    }

    #[tokio::test]
    async fn bootstrap_tools_execute() {
        let mut config = RuntimeConfig::default();
        config.tools.push(echo_entry());
        let runtime = runtime(config).await;
        runtime.start().unwrap();

        let input = json!({"text": "hi"}).as_object().cloned().unwrap();
        let result = runtime
            .execute(ExecutionRequest::new("echo", "say", input))
            .await
            .unwrap();
        assert!(result.success, "{result:?}");
        assert_eq!(result.output["text"], json!("hi"));
        assert!(result.journal_entry.is_some());

        assert!(runtime.unregister_tool("echo"));
        assert!(!runtime.unregister_tool("echo"));
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_work() {
        let runtime = runtime(RuntimeConfig::default()).await;
        runtime.start().unwrap();
        assert_eq!(runtime.shutdown(Duration::from_millis(50)).await.unwrap(), 0);
        assert!(runtime.state().is_terminal());
        assert_eq!(runtime.shutdown(Duration::from_millis(50)).await.unwrap(), 0);

        let response = runtime
            .handle_rpc(RpcRequest::new(1, "tools/list", None), &CallerIdentity::anonymous())
            .await;
        assert_eq!(response.error.unwrap().code, INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn filesystem_defaults_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.loader.plugins_dir = dir.path().join("plugins");
        config.execution.journal_path = Some(dir.path().join("journal/executions.ndjson"));
        config.tools.push(echo_entry());

        let providers = Arc::new(ProviderRegistry::new());
        providers
            .register_provider(
                "echo",
                Arc::new(|_: Invocation| async { Ok::<_, ProviderError>(json!("ok")) }),
            )
            .unwrap();
        let runtime = ToolRuntime::builder(config).providers(providers).build().await.unwrap();
        runtime.start().unwrap();

        let input = json!({"text": "hi"}).as_object().cloned().unwrap();
        let result = runtime
            .execute(ExecutionRequest::new("echo", "say", input))
            .await
            .unwrap();
        assert_eq!(result.output["result"], json!("ok"));
        let journal = std::fs::read_to_string(dir.path().join("journal/executions.ndjson")).unwrap();
        assert_eq!(journal.lines().count(), 1);
        assert!(!runtime.reload_routing().unwrap());
    }

    #[tokio::test]
    async fn delegated_routing_needs_an_adapter() {
        let mut config = RuntimeConfig::default();
        config.routing.strategy = RoutingStrategy::Delegated;
        let err = ToolRuntime::builder(config).build().await.unwrap_err();
        assert!(matches!(err, RuntimeError::MissingAdapter));
    }

    #[tokio::test]
    async fn clashing_bootstrap_entries_abort_start() {
        let mut config = RuntimeConfig::default();
        config.tools.push(echo_entry());
        let runtime = runtime(config).await;
        runtime
            .register_tool(echo_entry().metadata, ToolConfiguration::new())
            .unwrap();

        let err = runtime.start().unwrap_err();
        assert!(matches!(err, RuntimeError::Registry(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(runtime.state().is_terminal());
    }
}
