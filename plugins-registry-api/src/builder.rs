use std::sync::Arc;

use parking_lot::RwLock;
use plugin_runtime_core::{AuthPlugin, PluginId};
use tracing::info;

use crate::error::{RegistryError, Result};
use crate::registry::PluginRegistry;

/// Collects the plugins of a configuration generation and builds the
/// registry, failing on the first configuration error.
#[derive(Default)]
pub struct RegistryBuilder {
    plugins: Vec<Arc<dyn AuthPlugin>>,
    fallback: Option<PluginId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin<P>(mut self, plugin: P) -> Self
    where
        P: AuthPlugin + 'static,
    {
        self.plugins.push(Arc::new(plugin));
        self
    }

    pub fn shared_plugin(mut self, plugin: Arc<dyn AuthPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins<I, P>(self, plugins: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AuthPlugin + 'static,
    {
        plugins.into_iter().fold(self, Self::plugin)
    }

    pub fn fallback(mut self, plugin_id: Option<PluginId>) -> Self {
        self.fallback = plugin_id;
        self
    }

    /// # Errors
    ///
    /// [`RegistryError::DuplicatePlugin`] when two plugins share an
    /// identifier, [`RegistryError::UnknownFallback`] when the fallback is
    /// not among the registered plugins.
    pub fn build(self) -> Result<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        for plugin in self.plugins {
            registry.register(plugin)?;
        }
        if let Some(fallback) = &self.fallback {
            if registry.get_plugin(fallback.as_str()).is_none() {
                return Err(RegistryError::UnknownFallback(fallback.to_string()));
            }
        }
        registry.set_fallback(self.fallback);
        info!(plugins = registry.len(), fallback = ?registry.fallback(), "Authentication plugin registry built");
        Ok(registry)
    }
}

/// Shared access to the current registry generation.
///
/// Readers take a snapshot and keep using it for the whole attempt; a
/// reload swaps the snapshot without blocking attempts already running.
#[derive(Clone)]
pub struct RegistryHandle {
    current: Arc<RwLock<Arc<PluginRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    pub fn snapshot(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.current.read())
    }

    /// Replace the registry; returns the previous generation.
    pub fn reload(&self, registry: PluginRegistry) -> Arc<PluginRegistry> {
        let next = Arc::new(registry);
        info!(plugins = next.len(), "Reloading authentication plugin registry");
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RegistryHandle").field(&self.snapshot()).finish()
    }
}
