use std::collections::HashMap;
use std::sync::Arc;

use plugin_runtime_core::{AuthPlugin, PluginContext, PluginId};
use tracing::{debug, warn};

use crate::error::{RegistryError, Result};

/// The plugins of one configuration generation.
///
/// Built once at start-up or reload and read-only afterwards; reloads swap
/// in a new registry through [`RegistryHandle`](crate::RegistryHandle).
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<PluginId, Arc<dyn AuthPlugin>>,
    fallback: Option<PluginId>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `plugin`; an identifier can only be registered once.
    pub fn register(&mut self, plugin: Arc<dyn AuthPlugin>) -> Result<()> {
        let id = plugin.id().clone();
        if self.plugins.contains_key(&id) {
            return Err(RegistryError::DuplicatePlugin(id.to_string()));
        }
        debug!(plugin = %id, "Register authentication plugin");
        self.plugins.insert(id, plugin);
        Ok(())
    }

    /// Plugin appended to every authentication order, see
    /// [`get_plugins_for_authentication`](Self::get_plugins_for_authentication).
    pub fn set_fallback(&mut self, plugin_id: Option<PluginId>) {
        self.fallback = plugin_id;
    }

    pub fn fallback(&self) -> Option<&PluginId> {
        self.fallback.as_ref()
    }

    pub fn get_plugin(&self, plugin_id: &str) -> Option<Arc<dyn AuthPlugin>> {
        self.plugins.get(&PluginId::new(plugin_id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Every registered plugin, sorted by display name.
    pub fn get_all_plugins(&self) -> Vec<Arc<dyn AuthPlugin>> {
        let mut plugins: Vec<_> = self.plugins.values().cloned().collect();
        plugins.sort_by_cached_key(|p| (p.display_name().to_lowercase(), p.id().clone()));
        plugins
    }

    /// Plugins to try, in order: the settings store's enabled list filtered
    /// to registered and active plugins, then the fallback plugin unless it
    /// is already in that filtered list. The fallback skips the active check.
    pub async fn get_plugins_for_authentication(&self, ctx: &PluginContext) -> Result<Vec<Arc<dyn AuthPlugin>>> {
        let enabled = ctx.settings.get_enabled_plugin_ids().await?;

        let mut plugins: Vec<Arc<dyn AuthPlugin>> = Vec::with_capacity(enabled.len() + 1);
        for plugin_id in &enabled {
            let Some(plugin) = self.get_plugin(plugin_id) else {
                warn!(plugin = %plugin_id, "Enabled plugin is not registered");
                continue;
            };
            if plugins.iter().any(|p| p.id() == plugin.id()) {
                continue;
            }
            if plugin.is_active(ctx).await? {
                plugins.push(plugin);
            } else {
                debug!(plugin = %plugin_id, "Enabled plugin is not active");
            }
        }

        if let Some(fallback) = &self.fallback {
            if !plugins.iter().any(|p| p.id() == fallback) {
                match self.plugins.get(fallback) {
                    Some(plugin) => {
                        debug!(plugin = %fallback, "Appending fallback plugin");
                        plugins.push(Arc::clone(plugin));
                    }
                    None => warn!(plugin = %fallback, "Fallback plugin is not registered"),
                }
            }
        }

        Ok(plugins)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.plugins.keys().map(PluginId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("PluginRegistry")
            .field("plugins", &ids)
            .field("fallback", &self.fallback)
            .finish()
    }
}
