//! Local-user materialisation for plugins whose identity source lives
//! outside the local user table.

use auth_identity::UserParams;
use crypto::PasswordGenerator;
use tracing::{debug, error, info, warn};

use crate::context::PluginContext;
use crate::contract::AuthPlugin;
use crate::error::Result;
use crate::identity::IdentityAttributes;

/// Length of the throwaway local password given to external users.
pub const FAKE_PASSWORD_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalPolicy {
    /// New local users may be created on first login
    pub allows_creating_users: bool,
    /// New local users get a random password instead of the real one
    pub use_fake_password: bool,
}

impl ExternalPolicy {
    pub const fn new(allows_creating_users: bool, use_fake_password: bool) -> Self {
        Self {
            allows_creating_users,
            use_fake_password,
        }
    }
}

impl Default for ExternalPolicy {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// Create or refresh the local user for `attrs` and synchronise the groups
/// owned by `plugin`, committing both as one unit of work.
///
/// Returns `None` when the source reports the account as deactivated; in
/// that case nothing is written.
pub async fn sync_external_identity(
    plugin: &dyn AuthPlugin,
    ctx: &PluginContext,
    policy: ExternalPolicy,
    password: &str,
    attrs: IdentityAttributes,
) -> Result<Option<IdentityAttributes>> {
    let username = attrs.username.clone();

    if attrs.active_from_extern == Some(false) {
        warn!(user = %username, plugin = %plugin.id(), "User authenticated at source but is inactive there");
        return Ok(None);
    }

    let existing = ctx.users.get_by_username(&username, true).await?;
    let (password_hash, active) = match &existing {
        Some(user) => {
            debug!(user = %username, plugin = %plugin.name(), "Syncing existing user from plugin");
            (user.password_hash.clone(), attrs.active)
        }
        None => {
            debug!(
                user = %username,
                plugin = %plugin.name(),
                allows_creating_users = policy.allows_creating_users,
                "Creating non-existing user from plugin"
            );
            let secret = if policy.use_fake_password {
                PasswordGenerator::generate(FAKE_PASSWORD_LENGTH)
            } else {
                password.to_string()
            };
            let active = match attrs.active_from_extern {
                Some(active) => active,
                None => plugin.user_activation_state(ctx).await?,
            };
            (ctx.hash_password(&secret).await?, active)
        }
    };

    let params = UserParams {
        username: username.clone(),
        email: attrs.email.clone(),
        firstname: attrs.firstname.clone(),
        lastname: attrs.lastname.clone(),
        active,
        admin: attrs.admin,
        extern_name: attrs.extern_name.clone(),
        extern_type: plugin.name().to_string(),
        password_hash,
    };

    let mut tx = ctx.users.begin().await?;
    let user = tx.create_or_update(params, policy.allows_creating_users).await?;

    let groups: Vec<String> = attrs.groups.iter().cloned().collect();
    if let Err(e) = tx.enforce_plugin_owned_groups(&user, &groups, plugin.name()).await {
        error!(user = %username, plugin = %plugin.name(), error = %e, "Group synchronisation failed");
    }

    tx.commit().await?;
    info!(user = %user.username, plugin = %plugin.name(), created = existing.is_none(), "Local user synchronised");
    Ok(Some(attrs))
}
