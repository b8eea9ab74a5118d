//! The execution service.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tool_primitives::ToolId;
use tool_registry::{Admission, ToolLease, ToolRegistry};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::PluginBackend;
use crate::error::DispatchError;
use crate::journal::{ExecutionJournal, JournalEntry};
use crate::limiter::LimiterSet;
use crate::provider::{Invocation, ProviderRegistry};
use crate::types::{ErrorKind, ExecutionRequest, ExecutionResult, into_output_map};
use crate::{http, process};

/// Executes capability requests.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Runs `request` to completion. Never fails; failures are reported in
    /// the returned [`ExecutionResult`].
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;
}

/// Service-wide execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    default_timeout: Duration,
    max_output_bytes: usize,
}

impl ExecutionConfig {
    /// Creates a configuration.
    #[must_use]
    pub const fn new(default_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            default_timeout,
            max_output_bytes,
        }
    }

    /// Upper bound on any single execution.
    #[must_use]
    pub const fn default_timeout(self) -> Duration {
        self.default_timeout
    }

    /// Ceiling on backend output read into memory.
    #[must_use]
    pub const fn max_output_bytes(self) -> usize {
        self.max_output_bytes
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 1024 * 1024)
    }
}

/// Half-open probe slot held by one execution. Unless the outcome was
/// reported, dropping it releases the slot, so a caller that abandons the
/// execution future cannot leave the breaker waiting forever.
struct ProbeSlot<'a> {
    registry: &'a ToolRegistry,
    tool: &'a str,
    id: ToolId,
    settled: bool,
}

impl<'a> ProbeSlot<'a> {
    fn new(registry: &'a ToolRegistry, tool: &'a str, id: ToolId) -> Self {
        Self {
            registry,
            tool,
            id,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if !self.settled && self.registry.release_probe(self.tool, self.id) {
            debug!(tool = self.tool, "unfinished probe released");
        }
    }
}

enum Outcome {
    Completed(Result<Value, DispatchError>),
    TimedOut,
    Cancelled,
}

/// Dispatches requests to tool backends under permission, concurrency,
/// deadline, and circuit-breaker control.
pub struct ExecutionService {
    registry: Arc<ToolRegistry>,
    providers: Arc<ProviderRegistry>,
    limiters: LimiterSet,
    journal: Option<Arc<dyn ExecutionJournal>>,
    http: OnceLock<http::BackendClient>,
    config: ExecutionConfig,
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("registry", &self.registry)
            .field("providers", &self.providers)
            .field("journal_configured", &self.journal.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionService {
    /// Creates a service with default settings and no journal.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            providers,
            limiters: LimiterSet::default(),
            journal: None,
            http: OnceLock::new(),
            config: ExecutionConfig::default(),
        }
    }

    /// Records every attempt in `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn ExecutionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Replaces the service settings.
    #[must_use]
    pub const fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Service settings.
    #[must_use]
    pub const fn config(&self) -> ExecutionConfig {
        self.config
    }

    /// Provider factories used for in-process tools.
    #[must_use]
    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Drops per-tool state (limiter and cached provider) of an
    /// unregistered tool.
    pub fn forget(&self, tool: ToolId) {
        self.limiters.forget(tool);
        self.providers.evict(tool);
    }

    fn http_client(&self) -> &http::BackendClient {
        self.http.get_or_init(http::backend_client)
    }

    fn deadline(&self, request: &ExecutionRequest, lease: &ToolLease, now: Instant) -> Instant {
        let mut deadline = now + self.config.default_timeout;
        if let Some(limit) = lease.record.config().limits().max_execution_time() {
            deadline = deadline.min(now + limit);
        }
        if let Some(requested) = request.deadline() {
            deadline = deadline.min(requested);
        }
        deadline
    }

    async fn dispatch(
        &self,
        backend: PluginBackend,
        lease: &ToolLease,
        request: &ExecutionRequest,
    ) -> Result<Value, DispatchError> {
        let record = &lease.record;
        let config = record.config();
        match backend {
            PluginBackend::InProcess { key } => {
                let provider = self.providers.resolve(record.id(), &key, config)?;
                let invocation = Invocation {
                    request_id: request.id(),
                    tool: request.tool().to_owned(),
                    capability: request.capability().to_owned(),
                    input: request.input().clone(),
                    caller: request.caller().clone(),
                };
                Ok(provider.invoke(invocation).await?)
            }
            PluginBackend::Process(spec) => {
                let payload = json!({
                    "request_id": request.id(),
                    "tool": request.tool(),
                    "capability": request.capability(),
                    "input": request.input(),
                    "caller": request.caller().user,
                });
                process::run(&spec, &payload, config.limits(), self.config.max_output_bytes).await
            }
            PluginBackend::Http(spec) => {
                let input = Value::Object(request.input().clone());
                http::post(
                    self.http_client(),
                    &spec,
                    request.capability(),
                    &input,
                    self.config.max_output_bytes,
                )
                .await
            }
        }
    }

    async fn record(&self, request: &ExecutionRequest, result: &mut ExecutionResult) {
        let Some(journal) = &self.journal else {
            return;
        };
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            request_id: request.id(),
            tool: request.tool().to_owned(),
            capability: request.capability().to_owned(),
            user: request.caller().user.clone(),
            success: result.success,
            error_kind: result.error_kind(),
            message: result.error.as_ref().map(|error| error.message.clone()),
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            recorded_at: Utc::now(),
        };
        match journal.append(&entry).await {
            Ok(()) => result.journal_entry = Some(entry.id),
            Err(err) => warn!(tool = %request.tool(), %err, "failed to journal execution"),
        }
    }

    /// Runs `request`; see [`ToolExecutor::execute`].
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let reject = |kind: ErrorKind, message: String| {
            debug!(tool = %request.tool(), capability = %request.capability(), %kind, %message, "execution rejected");
            ExecutionResult::failed(&request, kind, message, started.elapsed())
        };

        let Some(lease) = self.registry.lease(request.tool()) else {
            return reject(ErrorKind::UnknownTool, format!("tool `{}` is not registered", request.tool()));
        };
        let record = &lease.record;
        let config = record.config();
        if !config.is_enabled() {
            return reject(ErrorKind::ToolDisabled, format!("tool `{}` is disabled", request.tool()));
        }
        let Some(capability) = record.metadata().capability(request.capability()) else {
            return reject(
                ErrorKind::Validation,
                format!("tool `{}` has no capability `{}`", request.tool(), request.capability()),
            );
        };
        let caller = request.caller();
        if !config.permits_user(caller.user.as_deref()) {
            return reject(
                ErrorKind::PermissionDenied,
                format!("caller may not use tool `{}`", request.tool()),
            );
        }
        let missing = caller.missing(capability.required_permissions());
        if !missing.is_empty() {
            return reject(
                ErrorKind::PermissionDenied,
                format!("missing permissions: {}", missing.join(", ")),
            );
        }
        let backend = match PluginBackend::resolve(record.name(), record.metadata().kind(), config) {
            Ok(backend) => backend,
            Err(err) => return reject(ErrorKind::ExecutionFailure, err.to_string()),
        };

        // Breaker before limiter, so an open circuit never queues for a slot.
        let mut probe = match self.registry.admit(request.tool()) {
            Ok(Admission::Rejected { retry_at }) => {
                return reject(
                    ErrorKind::ToolUnavailable,
                    format!("circuit open for tool `{}` until {retry_at}", request.tool()),
                );
            }
            Ok(admission) => {
                debug!(tool = %request.tool(), ?admission, "execution admitted");
                (admission == Admission::Probe)
                    .then(|| ProbeSlot::new(&self.registry, request.tool(), record.id()))
            }
            Err(err) => return reject(ErrorKind::UnknownTool, err.to_string()),
        };

        let _permit = match self.limiters.acquire(record.id(), config.limits()).await {
            Ok(permit) => permit,
            Err(saturated) => {
                return reject(
                    ErrorKind::Backpressure,
                    format!(
                        "tool `{}` is at capacity ({} running, {} queued)",
                        request.tool(),
                        saturated.capacity,
                        saturated.queue_depth
                    ),
                );
            }
        };

        let deadline = self.deadline(&request, &lease, Instant::now());
        let outcome = tokio::select! {
            biased;
            () = lease.cancel.cancelled() => Outcome::Cancelled,
            completed = tokio::time::timeout_at(
                tokio::time::Instant::from_std(deadline),
                self.dispatch(backend, &lease, &request),
            ) => completed.map_or(Outcome::TimedOut, Outcome::Completed),
        };

        let elapsed = started.elapsed();
        let mut result = match outcome {
            Outcome::Completed(Ok(value)) => {
                ExecutionResult::succeeded(&request, into_output_map(value), elapsed)
            }
            Outcome::Completed(Err(err)) => {
                ExecutionResult::failed(&request, ErrorKind::ExecutionFailure, err.to_string(), elapsed)
            }
            Outcome::TimedOut => ExecutionResult::failed(
                &request,
                ErrorKind::ExecutionTimeout,
                format!("deadline exceeded after {elapsed:?}"),
                elapsed,
            ),
            Outcome::Cancelled => ExecutionResult::failed(
                &request,
                ErrorKind::Cancelled,
                format!("tool `{}` was unregistered", request.tool()),
                elapsed,
            ),
        };

        if !matches!(result.error_kind(), Some(ErrorKind::Cancelled)) {
            // The entry may have been replaced while the call ran; only the
            // lease's own generation receives the outcome.
            let current = self.registry.get(request.tool()).map(|current| current.id());
            if current == Some(record.id()) {
                match self.registry.report_outcome(request.tool(), result.success) {
                    Ok(_) => {
                        if let Some(slot) = probe.as_mut() {
                            slot.settle();
                        }
                    }
                    Err(err) => {
                        warn!(tool = %request.tool(), %err, "failed to report execution outcome");
                    }
                }
            }
        }
        if let Some(error) = &result.error {
            warn!(tool = %request.tool(), capability = %request.capability(), %error, "execution failed");
        } else {
            debug!(tool = %request.tool(), capability = %request.capability(), ?elapsed, "execution succeeded");
        }

        self.record(&request, &mut result).await;
        result
    }
}

#[async_trait]
impl ToolExecutor for ExecutionService {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        ExecutionService::execute(self, request).await
    }
}
