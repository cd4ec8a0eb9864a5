use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use auth_gateway::Authenticator;
use auth_plugins::{BuiltinPlugin, PluginSources};
use config_engine::{AuthEngineConfig, InMemorySettingsStore, SettingValue};
use crypto::{Argon2Params, SettingsCipher, UpgradingHasher};
use logger_redacted::{redacted_debug, redacted_info};
use plugin_runtime_core::{AuthPlugin, Environ, IdentityAttributes, PluginContext, PluginId};
use plugins_registry_api::{RegistryBuilder, RegistryHandle};
use serde::Serialize;
use tracing::info;

use crate::seed::Seed;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MASK: &str = "********";

/// Fully wired authentication chain over in-memory stores.
pub struct Engine {
    pub authenticator: Authenticator,
}

impl Engine {
    /// Build stores from `seed`, register every built-in plugin and apply
    /// the seeded settings.
    pub async fn build(config: &AuthEngineConfig, seed: &Seed) -> Result<Self> {
        let settings = match &config.settings_encryption_key {
            Some(key) => InMemorySettingsStore::new(Arc::new(
                SettingsCipher::from_base64(key).context("invalid settings_encryption_key")?,
            )),
            None => InMemorySettingsStore::ephemeral()?,
        };
        let hasher = UpgradingHasher::new(Argon2Params::default());
        let users = seed.user_repository(&hasher)?;
        let ctx = PluginContext::new(Arc::new(settings), Arc::new(users), Arc::new(hasher));

        let sources = PluginSources::new(config.plugin_timeout().unwrap_or(DEFAULT_HTTP_TIMEOUT))?;
        let registry = RegistryBuilder::new()
            .plugins(BuiltinPlugin::all(&sources))
            .fallback(config.fallback_plugin.as_deref().map(PluginId::new))
            .build()?;
        seed.apply_settings(&ctx, &registry).await?;

        let authenticator = Authenticator::new(RegistryHandle::new(registry), ctx).with_config(config);
        info!(?authenticator, "Authentication chain ready");
        Ok(Self { authenticator })
    }

    fn ctx(&self) -> &PluginContext {
        self.authenticator.context()
    }

    fn plugin(&self, plugin_id: &str) -> Result<Arc<dyn AuthPlugin>> {
        self.authenticator
            .registry()
            .snapshot()
            .get_plugin(plugin_id)
            .with_context(|| format!("no plugin registered as `{plugin_id}`"))
    }
}

#[derive(Debug, Serialize)]
pub struct PluginRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub enabled: bool,
    pub active: bool,
    pub container: bool,
}

#[derive(Debug, Serialize)]
pub struct SettingRow {
    pub name: String,
    pub title: String,
    pub value: SettingValue,
    pub encrypted: bool,
}

pub async fn authenticate(
    engine: &Engine,
    username: &str,
    password: &str,
    channel: &str,
    headers: Vec<(String, String)>,
    skip_missing: bool,
) -> Result<Option<IdentityAttributes>> {
    for (key, value) in &headers {
        redacted_debug!("request environ {key}: {value}");
    }
    let environ: Environ = headers.into_iter().collect();
    let environ = (!environ.is_empty()).then_some(environ);
    Ok(engine
        .authenticator
        .authenticate(username, password, environ.as_ref(), channel, skip_missing)
        .await?)
}

pub async fn list_plugins(engine: &Engine) -> Result<Vec<PluginRow>> {
    let mut rows = Vec::new();
    for plugin in engine.authenticator.registry().snapshot().get_all_plugins() {
        rows.push(PluginRow {
            id: plugin.id().to_string(),
            name: plugin.name().to_string(),
            display_name: plugin.display_name().to_string(),
            enabled: plugin.is_enabled(engine.ctx()).await?,
            active: plugin.is_active(engine.ctx()).await?,
            container: plugin.is_container_auth(),
        });
    }
    Ok(rows)
}

/// Every schema setting of a plugin, sensitive values masked.
pub async fn plugin_settings(engine: &Engine, plugin_id: &str) -> Result<Vec<SettingRow>> {
    let plugin = engine.plugin(plugin_id)?;
    let values = plugin.get_settings(engine.ctx()).await?;
    Ok(plugin
        .settings_schema()
        .nodes()
        .iter()
        .map(|node| SettingRow {
            name: node.name.clone(),
            title: node.title.clone(),
            value: if node.encrypted {
                SettingValue::from(MASK)
            } else {
                values.get(&node.name).cloned().unwrap_or_else(|| node.default.clone())
            },
            encrypted: node.encrypted,
        })
        .collect())
}

/// Parse `raw` as the type the schema declares, store it and record it in
/// the seed.
pub async fn set_setting(
    engine: &Engine,
    seed: &mut Seed,
    plugin_id: &str,
    name: &str,
    raw: &str,
) -> Result<SettingValue> {
    let plugin = engine.plugin(plugin_id)?;
    let schema = plugin.settings_schema();
    let Some(node) = schema.node(name) else {
        bail!("plugin `{plugin_id}` has no setting `{name}`");
    };
    redacted_info!("{plugin_id} setting {name}={raw}");
    let value = SettingValue::parse_as(node.kind, raw)?;
    let stored = plugin
        .create_or_update_setting(engine.ctx(), name, value)
        .await?;
    engine.authenticator.invalidate_cache(plugin_id);
    seed.plugins
        .entry(plugin_id.to_string())
        .or_default()
        .insert(name.to_string(), stored.clone());
    Ok(stored)
}

/// Replace the enabled list; every id must be registered.
pub async fn enable_plugins(engine: &Engine, seed: &mut Seed, plugin_ids: Vec<String>) -> Result<()> {
    for id in &plugin_ids {
        engine.plugin(id)?;
    }
    engine
        .ctx()
        .settings
        .set_enabled_plugin_ids(plugin_ids.clone())
        .await?;
    seed.enabled_plugins = plugin_ids;
    Ok(())
}
