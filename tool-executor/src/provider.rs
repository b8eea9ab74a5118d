//! In-process capability providers and the factory registry that builds them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tool_primitives::{ToolConfiguration, ToolId};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::types::{CallerIdentity, ValueMap};

/// Everything a provider receives for one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Request identifier.
    pub request_id: Uuid,
    /// Tool name.
    pub tool: String,
    /// Capability name.
    pub capability: String,
    /// Input map.
    pub input: ValueMap,
    /// Calling identity.
    pub caller: CallerIdentity,
}

/// Implementation of a tool's capabilities that runs inside the process.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Invokes one capability, returning its output.
    async fn invoke(&self, invocation: Invocation) -> ProviderResult<Value>;
}

#[async_trait]
impl<F, Fut> CapabilityProvider for F
where
    F: Send + Sync + Fn(Invocation) -> Fut,
    Fut: Future<Output = ProviderResult<Value>> + Send,
{
    async fn invoke(&self, invocation: Invocation) -> ProviderResult<Value> {
        (self)(invocation).await
    }
}

/// Builds a provider for a tool from its configuration.
pub type ProviderFactory =
    Arc<dyn Fn(&ToolConfiguration) -> ProviderResult<Arc<dyn CapabilityProvider>> + Send + Sync>;

/// Link-time provider submission, collected with [`inventory`].
///
/// ```ignore
/// inventory::submit! {
///     ProviderRegistration::new("echo", |_| Ok(Arc::new(EchoProvider)))
/// }
/// ```
pub struct ProviderRegistration {
    key: &'static str,
    build: fn(&ToolConfiguration) -> ProviderResult<Arc<dyn CapabilityProvider>>,
}

impl ProviderRegistration {
    /// Declares a factory under `key`.
    #[must_use]
    pub const fn new(
        key: &'static str,
        build: fn(&ToolConfiguration) -> ProviderResult<Arc<dyn CapabilityProvider>>,
    ) -> Self {
        Self { key, build }
    }

    /// Factory key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }
}

inventory::collect!(ProviderRegistration);

/// String-keyed provider factories plus a per-tool instance cache.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, ProviderFactory>>,
    instances: RwLock<HashMap<ToolId, Arc<dyn CapabilityProvider>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("factories", &self.keys())
            .field(
                "instances",
                &self.instances.read().expect("provider cache poisoned").len(),
            )
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with every link-time
    /// [`ProviderRegistration`]. Later submissions of a key shadow earlier ones.
    #[must_use]
    pub fn with_submitted() -> Self {
        let registry = Self::new();
        {
            let mut factories = registry.factories.write().expect("provider factories poisoned");
            for registration in inventory::iter::<ProviderRegistration> {
                let build = registration.build;
                factories.insert(registration.key.to_owned(), Arc::new(build));
            }
        }
        registry
    }

    /// Registers a factory.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DuplicateFactory`] when the key is taken.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn register_factory<F>(&self, key: impl Into<String>, factory: F) -> ProviderResult<()>
    where
        F: Fn(&ToolConfiguration) -> ProviderResult<Arc<dyn CapabilityProvider>>
            + Send
            + Sync
            + 'static,
    {
        let key = key.into();
        let mut factories = self.factories.write().expect("provider factories poisoned");
        if factories.contains_key(&key) {
            return Err(ProviderError::DuplicateFactory { key });
        }
        debug!(%key, "provider factory registered");
        factories.insert(key, Arc::new(factory));
        Ok(())
    }

    /// Registers a ready-made provider shared by every tool using `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DuplicateFactory`] when the key is taken.
    pub fn register_provider(
        &self,
        key: impl Into<String>,
        provider: Arc<dyn CapabilityProvider>,
    ) -> ProviderResult<()> {
        self.register_factory(key, move |_| Ok(Arc::clone(&provider)))
    }

    /// Returns `true` when a factory exists under `key`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.factories
            .read()
            .expect("provider factories poisoned")
            .contains_key(key)
    }

    /// Registered factory keys, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .factories
            .read()
            .expect("provider factories poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Returns the cached provider for `tool`, building it with the `key`
    /// factory on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownFactory`] when no factory is registered
    /// under `key`, or whatever the factory returns.
    ///
    /// # Panics
    ///
    /// Panics if the internal locks are poisoned.
    pub fn resolve(
        &self,
        tool: ToolId,
        key: &str,
        config: &ToolConfiguration,
    ) -> ProviderResult<Arc<dyn CapabilityProvider>> {
        if let Some(provider) = self.instances.read().expect("provider cache poisoned").get(&tool) {
            return Ok(Arc::clone(provider));
        }

        let factory = self
            .factories
            .read()
            .expect("provider factories poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownFactory { key: key.to_owned() })?;
        let provider = factory(config)?;

        let mut instances = self.instances.write().expect("provider cache poisoned");
        let cached = instances.entry(tool).or_insert(provider);
        Ok(Arc::clone(cached))
    }

    /// Drops the cached instance for `tool`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn evict(&self, tool: ToolId) -> bool {
        self.instances
            .write()
            .expect("provider cache poisoned")
            .remove(&tool)
            .is_some()
    }
}
