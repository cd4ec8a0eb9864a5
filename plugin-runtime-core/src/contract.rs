//! The plugin contract
//!
//! Every identity source implements [`AuthPlugin`]. The provided methods
//! carry the shared behaviour: settings access through the settings store,
//! the default user lookup and the acceptance gate evaluated before `auth()`.

use async_trait::async_trait;
use auth_identity::LocalUser;
use config_engine::{plugin_setting_key, SettingType, SettingValue};
use tracing::debug;

use crate::context::PluginContext;
use crate::error::{ContractError, Result};
use crate::external::ExternalPolicy;
use crate::identity::{AuthOutcome, Channel, Environ, PluginId};
use crate::schema::{PluginSettings, SettingsSchema, ENABLED_SETTING};

/// Per-attempt facts a plugin may need for its acceptance rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    pub channel: Channel,
    /// Names of the plugins taking part in this attempt, in order
    pub active_plugin_names: Vec<String>,
}

impl AttemptContext {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            active_plugin_names: Vec::new(),
        }
    }

    pub fn with_active_plugins<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_plugin_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Parameters of the acceptance gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceRules {
    pub allows_non_existing_user: bool,
    /// Accepted `extern_type` bindings; `None` means only the plugin itself
    pub allowed_auth_plugins: Option<Vec<String>>,
    /// Accepted channels; `None` means both
    pub allowed_auth_sources: Option<Vec<Channel>>,
}

impl Default for AcceptanceRules {
    fn default() -> Self {
        Self {
            allows_non_existing_user: true,
            allowed_auth_plugins: None,
            allowed_auth_sources: None,
        }
    }
}

impl AcceptanceRules {
    pub fn existing_users_only(mut self) -> Self {
        self.allows_non_existing_user = false;
        self
    }

    pub fn for_plugins(mut self, names: Vec<String>) -> Self {
        self.allowed_auth_plugins = Some(names);
        self
    }

    pub fn for_channels(mut self, channels: Vec<Channel>) -> Self {
        self.allowed_auth_sources = Some(channels);
        self
    }
}

/// Whether plugin `plugin_name` may try to authenticate `user` over
/// `channel`. Pure; evaluated before any call to the identity source.
pub fn allows_authentication_from(
    plugin_name: &str,
    user: Option<&LocalUser>,
    channel: Channel,
    rules: &AcceptanceRules,
) -> bool {
    let Some(user) = user else {
        if !rules.allows_non_existing_user {
            debug!(plugin = %plugin_name, "User is empty but plugin does not allow empty users");
            return false;
        }
        return channel_allowed(plugin_name, channel, rules);
    };

    if let Some(bound) = user.bound_extern_type() {
        let allowed = match &rules.allowed_auth_plugins {
            Some(names) if !names.is_empty() => names.iter().any(|n| n == bound),
            _ => bound == plugin_name,
        };
        if !allowed {
            debug!(
                plugin = %plugin_name,
                user = %user.username,
                extern_type = %bound,
                "User is bound to another auth type, skipping"
            );
            return false;
        }
    }

    channel_allowed(plugin_name, channel, rules)
}

fn channel_allowed(plugin_name: &str, channel: Channel, rules: &AcceptanceRules) -> bool {
    let allowed = match &rules.allowed_auth_sources {
        Some(sources) if !sources.is_empty() => sources.contains(&channel),
        _ => true,
    };
    if !allowed {
        debug!(plugin = %plugin_name, channel = %channel, "Plugin does not accept this channel");
    }
    allowed
}

/// Inputs of one credential check.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    /// Local user resolved by the plugin's `get_user`
    pub user: Option<&'a LocalUser>,
    pub username: &'a str,
    pub password: &'a str,
    pub settings: &'a PluginSettings,
    pub environ: Option<&'a Environ>,
    pub channel: Channel,
}

/// Default user resolution: exact match, then case-insensitive.
pub async fn lookup_user(ctx: &PluginContext, username: &str) -> Result<Option<LocalUser>> {
    if username.is_empty() {
        debug!("Provided username is empty, skipping user lookup");
        return Ok(None);
    }
    if let Some(user) = ctx.users.get_by_username(username, false).await? {
        return Ok(Some(user));
    }
    debug!(user = %username, "User not found, retrying case-insensitive");
    let user = ctx.users.get_by_username(username, true).await?;
    if user.is_none() {
        debug!(user = %username, "User not found in local store");
    }
    Ok(user)
}

/// An authentication source.
#[async_trait]
pub trait AuthPlugin: Send + Sync {
    /// Identifier the plugin was registered under.
    fn id(&self) -> &PluginId;

    /// Canonical name: settings namespace and `extern_type` tag.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Container plugins authenticate from the request environment and are
    /// the only ones consulted when no credentials were supplied.
    fn is_container_auth(&self) -> bool {
        false
    }

    /// Cache lifetime fixed in code; wins over the `cache_ttl` setting.
    fn auth_cache_ttl(&self) -> Option<u64> {
        None
    }

    fn settings_schema(&self) -> SettingsSchema {
        SettingsSchema::base()
    }

    fn acceptance_rules(&self, _attempt: &AttemptContext) -> AcceptanceRules {
        AcceptanceRules::default()
    }

    /// `Some` for plugins whose identities are materialised as local users.
    fn external_policy(&self) -> Option<ExternalPolicy> {
        None
    }

    fn allows_creating_users(&self) -> bool {
        self.external_policy().is_some_and(|p| p.allows_creating_users)
    }

    fn allows_authentication_from(&self, user: Option<&LocalUser>, attempt: &AttemptContext) -> bool {
        allows_authentication_from(self.name(), user, attempt.channel, &self.acceptance_rules(attempt))
    }

    async fn get_user(
        &self,
        ctx: &PluginContext,
        username: &str,
        _environ: Option<&Environ>,
        _settings: Option<&PluginSettings>,
    ) -> Result<Option<LocalUser>> {
        lookup_user(ctx, username).await
    }

    /// Whether users created by this plugin start active.
    async fn user_activation_state(&self, ctx: &PluginContext) -> Result<bool>;

    /// Check credentials against the identity source. A mismatch is
    /// `Ok(AuthOutcome::Rejected(..))`; errors are reserved for faults.
    async fn auth(&self, ctx: &PluginContext, request: &AuthRequest<'_>) -> Result<AuthOutcome>;

    /// Listed in the settings store's enabled plugins.
    async fn is_enabled(&self, ctx: &PluginContext) -> Result<bool> {
        let ids = ctx.settings.get_enabled_plugin_ids().await?;
        Ok(ids.iter().any(|id| id == self.id().as_str()))
    }

    /// The plugin's own `enabled` setting is true.
    async fn is_active(&self, ctx: &PluginContext) -> Result<bool> {
        Ok(self
            .get_setting_by_name(ctx, ENABLED_SETTING)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn get_setting_by_name(&self, ctx: &PluginContext, name: &str) -> Result<Option<SettingValue>> {
        Ok(ctx.settings.get_setting(&plugin_setting_key(self.name(), name)).await?)
    }

    /// Validate `value` against the schema and store it, encrypted when the
    /// schema marks the setting as sensitive.
    async fn create_or_update_setting(
        &self,
        ctx: &PluginContext,
        name: &str,
        value: SettingValue,
    ) -> Result<SettingValue> {
        let schema = self.settings_schema();
        let node = schema.node(name).ok_or_else(|| ContractError::UnknownSetting {
            plugin: self.name().to_string(),
            setting: name.to_string(),
        })?;
        let value = node.coerce(value)?;
        let setting_type = SettingType::infer(&value, node.encrypted);
        let key = plugin_setting_key(self.name(), name);
        debug!(plugin = %self.id(), setting = %name, setting_type = %setting_type, "Storing plugin setting");
        Ok(ctx.settings.create_or_update_setting(&key, value, setting_type).await?)
    }

    /// Every schema setting, falling back to its default when unset.
    async fn get_settings(&self, ctx: &PluginContext) -> Result<PluginSettings> {
        let mut settings = PluginSettings::new();
        for node in self.settings_schema().nodes() {
            let value = self
                .get_setting_by_name(ctx, &node.name)
                .await?
                .unwrap_or_else(|| node.default.clone());
            settings.insert(&node.name, value);
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(extern_type: &str) -> LocalUser {
        LocalUser::new(1, "alice").with_extern_type(extern_type)
    }

    #[test]
    fn test_rejects_missing_user_when_required() {
        let rules = AcceptanceRules::default().existing_users_only();
        assert!(!allows_authentication_from("rhodecode", None, Channel::Http, &rules));
        assert!(allows_authentication_from("ldap", None, Channel::Http, &AcceptanceRules::default()));
    }

    #[test]
    fn test_rejects_user_bound_to_other_plugin() {
        let rules = AcceptanceRules::default();
        let user = bound("rhodecode");
        assert!(!allows_authentication_from("ldap", Some(&user), Channel::Http, &rules));
        assert!(allows_authentication_from("rhodecode", Some(&user), Channel::Http, &rules));
    }

    #[test]
    fn test_unbound_user_is_accepted_by_anyone() {
        let user = LocalUser::new(1, "alice");
        assert!(allows_authentication_from("pam", Some(&user), Channel::Vcs, &AcceptanceRules::default()));
    }

    #[test]
    fn test_allowed_plugin_list_overrides_own_name() {
        let rules = AcceptanceRules::default().for_plugins(vec!["authtoken".into(), "ldap".into()]);
        assert!(allows_authentication_from("authtoken", Some(&bound("ldap")), Channel::Vcs, &rules));
        assert!(!allows_authentication_from("authtoken", Some(&bound("pam")), Channel::Vcs, &rules));
    }

    #[test]
    fn test_channel_restriction() {
        let rules = AcceptanceRules::default().for_channels(vec![Channel::Vcs]);
        let user = bound("authtoken");
        assert!(!allows_authentication_from("authtoken", Some(&user), Channel::Http, &rules));
        assert!(allows_authentication_from("authtoken", Some(&user), Channel::Vcs, &rules));
    }
}
