//! YAML seed for the in-memory stores
//!
//! ```yaml
//! enabled_plugins: [rhodecode, authtoken]
//! default_permissions: [hg.extern_activate.auto]
//! plugins:
//!   rhodecode:
//!     enabled: true
//! users:
//!   - username: alice
//!     password: secret
//!     extern_type: rhodecode
//!     auth_tokens:
//!       - { token: tok-vcs, role: vcs }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use auth_identity::{AuthToken, InMemoryUserRepository, LocalUser};
use config_engine::SettingValue;
use crypto::CredentialHasher;
use plugin_runtime_core::PluginContext;
use plugins_registry_api::PluginRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Authentication order
    pub enabled_plugins: Vec<String>,
    pub default_permissions: Vec<String>,
    /// Plugin id to setting name to value
    pub plugins: BTreeMap<String, BTreeMap<String, SettingValue>>,
    pub users: Vec<SeedUser>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    /// Cleartext, hashed when the seed is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extern_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_tokens: Vec<AuthToken>,
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("active", &self.active)
            .field("admin", &self.admin)
            .field("extern_type", &self.extern_type)
            .field("auth_tokens", &self.auth_tokens.len())
            .finish_non_exhaustive()
    }
}

impl Seed {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid seed document")
    }

    /// Read `path`, or an empty seed when it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Seed file not found, starting empty");
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path).with_context(|| format!("cannot read seed {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).with_context(|| format!("cannot write seed {}", path.display()))?;
        info!(path = %path.display(), "Seed saved");
        Ok(())
    }

    /// User store holding the seeded users, tokens and default permissions.
    pub fn user_repository(&self, hasher: &dyn CredentialHasher) -> Result<InMemoryUserRepository> {
        let repo = InMemoryUserRepository::new().with_default_permissions(self.default_permissions.iter().cloned());
        for seeded in &self.users {
            let hash = match (&seeded.password_hash, &seeded.password) {
                (Some(hash), _) => hash.clone(),
                (None, Some(password)) => hasher
                    .create_hash(password)
                    .with_context(|| format!("cannot hash password of {}", seeded.username))?,
                (None, None) => String::new(),
            };
            let mut user = LocalUser::new(0, seeded.username.as_str())
                .with_names(seeded.firstname.as_str(), seeded.lastname.as_str())
                .with_email(seeded.email.as_str())
                .with_password_hash(hash)
                .with_active(seeded.active)
                .with_admin(seeded.admin);
            if let Some(extern_type) = &seeded.extern_type {
                user = user.with_extern_type(extern_type.as_str());
            }
            repo.insert_user(user);
            for token in &seeded.auth_tokens {
                repo.add_auth_token(&seeded.username, token.clone());
            }
        }
        debug!(users = self.users.len(), "Seeded user store");
        Ok(repo)
    }

    /// Write plugin settings and the enabled list through the plugins so
    /// that schema validation and encryption apply.
    pub async fn apply_settings(&self, ctx: &PluginContext, registry: &PluginRegistry) -> Result<()> {
        for (plugin_id, values) in &self.plugins {
            let plugin = registry
                .get_plugin(plugin_id)
                .with_context(|| format!("seed configures unknown plugin `{plugin_id}`"))?;
            for (name, value) in values {
                plugin
                    .create_or_update_setting(ctx, name, value.clone())
                    .await
                    .with_context(|| format!("invalid setting `{name}` for plugin `{plugin_id}`"))?;
            }
        }
        ctx.settings
            .set_enabled_plugin_ids(self.enabled_plugins.clone())
            .await?;
        Ok(())
    }
}
