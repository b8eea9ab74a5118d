use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde_json::{Value, json};
use tool_runtime::config::{RuntimeConfig, ToolEntry};
use tool_runtime::executor::{
    CallerIdentity, ErrorKind, ExecutionJournal, ExecutionRequest, Invocation, MemoryJournal,
    ProviderError, ProviderRegistry, ValueMap,
};
use tool_runtime::loader::MemoryBlobStore;
use tool_runtime::primitives::{
    ParamType, ParameterSpec, ToolCapability, ToolConfiguration, ToolKind, ToolMetadata, settings,
};
use tool_runtime::projector::{Projection, ProjectionFormat, RpcRequest};
use tool_runtime::registry::CircuitState;
use tool_runtime::router::{RoutingConfig, RoutingContext};
use tool_runtime::{RuntimeError, ToolRuntime};

const ROUTING: &str = r#"
tools:
  weather:
    patterns:
      - pattern: '\b(weather|forecast|temperature)\b'
        weight: 2.0
        capability: get_current
settings:
  default_tool: general
  confidence_threshold: 0.3
"#;

struct WeatherService {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl WeatherService {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn weather_entry() -> ToolEntry {
    ToolEntry {
        metadata: ToolMetadata::builder("weather", ToolKind::Internal)
            .version("1.0.0")
            .unwrap()
            .description("Weather lookups")
            .capability(
                ToolCapability::builder("get_current")
                    .description("Current conditions for a location")
                    .input(ParameterSpec::new("location", ParamType::String).required())
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap(),
        config: ToolConfiguration::new().with_setting(settings::PROVIDER, "weather"),
    }
}

async fn runtime() -> (ToolRuntime, Arc<WeatherService>, Arc<MemoryJournal>) {
    let service = Arc::new(WeatherService {
        calls: AtomicUsize::new(0),
        failing: AtomicBool::new(false),
    });
    let providers = Arc::new(ProviderRegistry::new());
    let backend = Arc::clone(&service);
    providers
        .register_provider(
            "weather",
            Arc::new(move |invocation: Invocation| {
                let backend = Arc::clone(&backend);
                async move {
                    backend.calls.fetch_add(1, Ordering::SeqCst);
                    if backend.failing.load(Ordering::SeqCst) {
                        return Err(ProviderError::failed("weather upstream unavailable"));
                    }
                    Ok(json!({
                        "location": invocation.input["location"],
                        "temperature_c": 21,
                    }))
                }
            }),
        )
        .unwrap();

    let mut config = RuntimeConfig::default();
    config.tools.push(weather_entry());
    let journal = Arc::new(MemoryJournal::new());
    let runtime = ToolRuntime::builder(config)
        .providers(providers)
        .blobs(Arc::new(MemoryBlobStore::new()))
        .journal(journal.clone())
        .routing(RoutingConfig::from_yaml_str(ROUTING).unwrap())
        .build()
        .await
        .unwrap();
    runtime.start().unwrap();
    (runtime, service, journal)
}

fn location(city: &str) -> ValueMap {
    json!({ "location": city }).as_object().cloned().unwrap()
}

#[tokio::test]
async fn weather_request_routes_executes_and_trips_the_breaker() {
    let (runtime, service, journal) = runtime().await;
    let context = RoutingContext::new().with_user("ada");

    let matched = runtime
        .route("What's the weather in Istanbul today?", &context)
        .await
        .unwrap();
    assert_eq!(matched.tool, "weather");
    assert_eq!(matched.capability.as_deref(), Some("get_current"));
    assert!(!matched.is_fallback());
    assert!(matched.confidence >= 0.3);

    let caller = CallerIdentity::user("ada");
    let request = ExecutionRequest::new(
        &matched.tool,
        matched.capability.as_deref().unwrap(),
        location("Istanbul"),
    )
    .with_caller(caller.clone());
    let result = runtime.execute(request).await.unwrap();
    assert!(result.success, "{result:?}");
    assert_eq!(result.output["location"], json!("Istanbul"));
    assert_eq!(service.calls(), 1);

    service.failing.store(true, Ordering::SeqCst);
    for attempt in 1..=5 {
        let result = runtime
            .execute(
                ExecutionRequest::new("weather", "get_current", location("Istanbul"))
                    .with_caller(caller.clone()),
            )
            .await
            .unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::ExecutionFailure), "attempt {attempt}");
    }
    assert_eq!(service.calls(), 6);
    let state = runtime.registry().get("weather").unwrap().health().state();
    assert_eq!(state, CircuitState::Open);

    let rejected = runtime
        .execute(
            ExecutionRequest::new("weather", "get_current", location("Istanbul"))
                .with_caller(caller.clone()),
        )
        .await
        .unwrap();
    assert_eq!(rejected.error_kind(), Some(ErrorKind::ToolUnavailable));
    assert!(rejected.error_kind().unwrap().is_retriable());
    assert_eq!(service.calls(), 6, "no sixth attempt reaches the backend");

    // Open tools disappear from routing and projection.
    let rerouted = runtime.route("weather in Oslo", &context).await.unwrap();
    assert!(rerouted.is_fallback());
    assert_eq!(rerouted.tool, "general");
    let Projection::Functions(functions) =
        runtime.project(ProjectionFormat::FunctionCalling, &caller)
    else {
        panic!("expected function declarations");
    };
    assert!(functions.is_empty());

    // Dispatched attempts are journaled; the circuit rejection is not.
    let entries = journal.tail(10).await.unwrap();
    assert_eq!(entries.len(), 6);
    assert!(entries[0].success);
    assert!(entries[1..].iter().all(|entry| entry.error_kind == Some(ErrorKind::ExecutionFailure)));

    assert_eq!(runtime.shutdown(Duration::from_secs(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn protocol_calls_validate_before_executing() {
    let (runtime, service, _) = runtime().await;
    let caller = CallerIdentity::anonymous();

    let listed = runtime
        .handle_rpc(RpcRequest::new(1, "tools/list", None), &caller)
        .await;
    let tools = listed.result.unwrap()["tools"].clone();
    assert_eq!(tools[0]["name"], json!("weather__get_current"));
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["location"]));

    let invalid = runtime
        .handle_rpc(
            RpcRequest::new(
                2,
                "tools/call",
                Some(json!({"name": "weather__get_current", "arguments": {}})),
            ),
            &caller,
        )
        .await;
    assert_eq!(invalid.error.unwrap().code, -32602);
    assert!(!runtime.validate_call("weather", "get_current", &ValueMap::new()).is_empty());
    assert_eq!(service.calls(), 0);

    let called = runtime
        .handle_rpc(
            RpcRequest::new(
                3,
                "tools/call",
                Some(json!({"name": "weather__get_current", "arguments": {"location": "Oslo"}})),
            ),
            &caller,
        )
        .await;
    let result = called.result.unwrap();
    assert_eq!(result["isError"], json!(false));
    let text: Value =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text["location"], json!("Oslo"));
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn rejected_uploads_leave_no_trace() {
    let (runtime, _, _) = runtime().await;

    let err = runtime
        .upload_plugin(Bytes::from_static(b"definitely not a zip"), "broken", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PluginLoad);
    assert!(!runtime.registry().contains("broken"));

    let err = runtime
        .upload_plugin(Bytes::new(), "Bad Name", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = runtime.delete_plugin("weather").await.unwrap_err();
    assert!(matches!(err, RuntimeError::Loader(_)));
    assert!(runtime.registry().contains("weather"));
}
