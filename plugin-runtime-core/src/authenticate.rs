use tracing::{debug, info, warn};

use crate::context::PluginContext;
use crate::contract::{AuthPlugin, AuthRequest};
use crate::error::Result;
use crate::external::sync_external_identity;
use crate::identity::{AuthOutcome, IdentityAttributes};

/// Run `plugin.auth()` and everything that must follow a success: hash
/// migration, validation of the returned record and, for external plugins,
/// local user synchronisation.
///
/// A malformed record is a [`ContractError`](crate::ContractError), never a
/// rejection.
pub async fn authenticate_plugin(
    plugin: &dyn AuthPlugin,
    ctx: &PluginContext,
    request: &AuthRequest<'_>,
) -> Result<Option<IdentityAttributes>> {
    let raw = match plugin.auth(ctx, request).await? {
        AuthOutcome::Authenticated(raw) => raw,
        AuthOutcome::Rejected(reason) => {
            debug!(plugin = %plugin.id(), user = %request.username, %reason, "Plugin rejected credentials");
            return Ok(None);
        }
    };

    if let Some(new_hash) = raw.hash_migrate.as_deref() {
        let username = request.user.map_or(request.username, |u| u.username.as_str());
        migrate_hash(ctx, username, request.password, new_hash).await?;
    }

    let attrs = raw.validate(plugin.name())?;

    match plugin.external_policy() {
        Some(policy) => sync_external_identity(plugin, ctx, policy, request.password, attrs).await,
        None => Ok(Some(attrs)),
    }
}

/// Store `new_hash` for `username` once it is confirmed to match `password`.
async fn migrate_hash(ctx: &PluginContext, username: &str, password: &str, new_hash: &str) -> Result<()> {
    if !ctx.check_password(password, new_hash).await? {
        warn!(user = %username, "Upgraded hash does not verify, keeping the stored one");
        return Ok(());
    }
    ctx.users.update_password_hash(username, new_hash).await?;
    info!(user = %username, "Migrated user password hash");
    Ok(())
}
