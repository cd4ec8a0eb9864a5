use std::sync::Arc;
use std::time::Duration;

use config_engine::{AuthEngineConfig, ConnectivityPolicy};
use plugin_runtime_core::{
    authenticate_plugin, AttemptContext, AuthPlugin, AuthRequest, Channel, Environ, IdentityAttributes,
    PluginContext, PluginSettings, CACHE_TTL_SETTING,
};
use plugins_registry_api::{PluginRegistry, RegistryError, RegistryHandle};
use tracing::{debug, info, warn};

use crate::cache::{AuthCache, CacheKey};
use crate::error::{AuthError, Result};

/// Runs an authentication attempt through the ordered plugin chain.
///
/// Plugins are tried one after another in the registry's authentication
/// order and the first one returning an identity wins.
pub struct Authenticator {
    registry: RegistryHandle,
    ctx: PluginContext,
    cache: AuthCache<Option<IdentityAttributes>>,
    plugin_timeout: Option<Duration>,
    connectivity_policy: ConnectivityPolicy,
}

impl Authenticator {
    pub fn new(registry: RegistryHandle, ctx: PluginContext) -> Self {
        Self {
            registry,
            ctx,
            cache: AuthCache::new(),
            plugin_timeout: None,
            connectivity_policy: ConnectivityPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: &AuthEngineConfig) -> Self {
        self.plugin_timeout = config.plugin_timeout();
        self.connectivity_policy = config.connectivity_policy;
        self
    }

    pub fn with_plugin_timeout(mut self, timeout: Duration) -> Self {
        self.plugin_timeout = Some(timeout);
        self
    }

    pub fn with_connectivity_policy(mut self, policy: ConnectivityPolicy) -> Self {
        self.connectivity_policy = policy;
        self
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Forget cached results of one plugin, e.g. after its settings changed.
    pub fn invalidate_cache(&self, plugin_id: &str) {
        self.cache.clear_namespace(plugin_id);
    }

    /// Authenticate over a channel given by name.
    ///
    /// # Errors
    ///
    /// An unknown channel fails before any plugin is consulted. See
    /// [`Authenticator::authenticate_on`] for the rest.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        environ: Option<&Environ>,
        channel: &str,
        skip_missing: bool,
    ) -> Result<Option<IdentityAttributes>> {
        let channel: Channel = channel.parse()?;
        self.authenticate_on(username, password, environ, channel, skip_missing)
            .await
    }

    /// Try every plugin in authentication order; `Ok(None)` when none of
    /// them authenticated the credentials.
    ///
    /// With `skip_missing` unset, an enabled plugin id that is not
    /// registered in this process is a configuration error.
    ///
    /// # Errors
    ///
    /// Configuration and contract errors always abort the attempt. An
    /// unreachable identity source aborts it under
    /// [`ConnectivityPolicy::FailClosed`] and is skipped under
    /// [`ConnectivityPolicy::SkipPlugin`].
    pub async fn authenticate_on(
        &self,
        username: &str,
        password: &str,
        environ: Option<&Environ>,
        channel: Channel,
        skip_missing: bool,
    ) -> Result<Option<IdentityAttributes>> {
        let registry = self.registry.snapshot();
        if !skip_missing {
            self.ensure_enabled_registered(&registry).await?;
        }

        let plugins = registry.get_plugins_for_authentication(&self.ctx).await?;
        let container_only = environ.is_some_and(|env| !env.is_empty()) && username.is_empty() && password.is_empty();
        let attempt = AttemptContext::new(channel).with_active_plugins(plugins.iter().map(|p| p.name()));
        debug!(
            user = %username,
            channel = %channel,
            container_only,
            plugins = ?attempt.active_plugin_names,
            "Starting authentication attempt"
        );

        for plugin in &plugins {
            match self
                .try_plugin(plugin, username, password, environ, &attempt, container_only)
                .await
            {
                Ok(Some(identity)) => {
                    info!(plugin = %plugin.id(), user = %identity.username, channel = %channel, "User authenticated");
                    return Ok(Some(identity));
                }
                Ok(None) => {}
                Err(err) if err.is_source_unavailable() && self.connectivity_policy == ConnectivityPolicy::SkipPlugin => {
                    warn!(plugin = %plugin.id(), error = %err, "Identity source unavailable, trying next plugin");
                }
                Err(err) => {
                    warn!(plugin = %plugin.id(), error = %err, "Authentication attempt aborted");
                    return Err(err);
                }
            }
        }

        debug!(user = %username, "No plugin authenticated the user");
        Ok(None)
    }

    async fn ensure_enabled_registered(&self, registry: &PluginRegistry) -> Result<()> {
        let enabled = self
            .ctx
            .settings
            .get_enabled_plugin_ids()
            .await
            .map_err(RegistryError::from)?;
        match enabled.into_iter().find(|id| registry.get_plugin(id).is_none()) {
            Some(missing) => Err(AuthError::UnregisteredPlugin(missing)),
            None => Ok(()),
        }
    }

    async fn try_plugin(
        &self,
        plugin: &Arc<dyn AuthPlugin>,
        username: &str,
        password: &str,
        environ: Option<&Environ>,
        attempt: &AttemptContext,
        container_only: bool,
    ) -> Result<Option<IdentityAttributes>> {
        let resolved = plugin.get_user(&self.ctx, username, environ, None).await?;
        debug!(
            plugin = %plugin.id(),
            user = ?resolved.as_ref().map(|u| u.username.as_str()),
            "Resolved local user"
        );
        if container_only && !plugin.is_container_auth() {
            debug!(plugin = %plugin.id(), "Not a container plugin, skipping credential-less attempt");
            return Ok(None);
        }

        // Settings are re-read on every attempt and may refine the lookup.
        let settings = plugin.get_settings(&self.ctx).await?;
        let user = plugin.get_user(&self.ctx, username, environ, Some(&settings)).await?;
        if !plugin.allows_authentication_from(user.as_ref(), attempt) {
            return Ok(None);
        }

        let request = AuthRequest {
            user: user.as_ref(),
            username,
            password,
            settings: &settings,
            environ,
            channel: attempt.channel,
        };
        let compute = self.call_plugin(plugin.as_ref(), &request);

        // Credential-less container attempts derive the identity from the
        // environment, which is not part of the key.
        let ttl = if username.is_empty() && plugin.is_container_auth() {
            None
        } else {
            effective_ttl(plugin.as_ref(), &settings)
        };
        match ttl {
            Some(ttl) => {
                debug!(plugin = %plugin.id(), ttl_secs = ttl.as_secs(), "Using auth cache");
                let key = CacheKey::new(plugin.name(), username, password);
                self.cache
                    .get_or_compute(plugin.id().as_str(), key, ttl, compute)
                    .await
            }
            None => compute.await,
        }
    }

    async fn call_plugin(&self, plugin: &dyn AuthPlugin, request: &AuthRequest<'_>) -> Result<Option<IdentityAttributes>> {
        let call = authenticate_plugin(plugin, &self.ctx, request);
        let Some(limit) = self.plugin_timeout else {
            return Ok(call.await?);
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AuthError::SourceUnavailable {
                plugin: plugin.id().to_string(),
                reason: format!("no answer within {} ms", limit.as_millis()),
            }),
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("registry", &self.registry)
            .field("plugin_timeout", &self.plugin_timeout)
            .field("connectivity_policy", &self.connectivity_policy)
            .finish_non_exhaustive()
    }
}

/// Cache lifetime for one plugin: the code constant wins over the
/// `cache_ttl` setting; zero or negative disables caching.
pub fn effective_ttl(plugin: &dyn AuthPlugin, settings: &PluginSettings) -> Option<Duration> {
    let secs = match plugin.auth_cache_ttl() {
        Some(secs) => secs,
        None => settings
            .get_int(CACHE_TTL_SETTING)
            .and_then(|secs| u64::try_from(secs).ok())
            .unwrap_or(0),
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}
