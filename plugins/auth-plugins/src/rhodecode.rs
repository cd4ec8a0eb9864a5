//! Internal database plugin: passwords checked against the local user table.

use async_trait::async_trait;
use auth_identity::permissions;
use plugin_runtime_core::{
    AcceptanceRules, AttemptContext, AuthOutcome, AuthPlugin, AuthRequest, PluginContext, PluginId, RawIdentity,
    RejectReason, Result,
};
use tracing::{debug, info, warn};

pub struct RhodeCodePlugin {
    id: PluginId,
}

impl RhodeCodePlugin {
    pub const NAME: &'static str = "rhodecode";

    pub fn new(id: impl Into<PluginId>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl AuthPlugin for RhodeCodePlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "Rhodecode"
    }

    fn acceptance_rules(&self, _attempt: &AttemptContext) -> AcceptanceRules {
        AcceptanceRules::default().existing_users_only()
    }

    async fn user_activation_state(&self, ctx: &PluginContext) -> Result<bool> {
        ctx.has_default_permission(permissions::REGISTER_AUTO_ACTIVATE).await
    }

    async fn auth(&self, ctx: &PluginContext, request: &AuthRequest<'_>) -> Result<AuthOutcome> {
        let Some(user) = request.user else {
            debug!("No local user, skipping");
            return Ok(AuthOutcome::Rejected(RejectReason::UnknownPrincipal));
        };
        if user.extern_type.as_deref() != Some(Self::NAME) {
            warn!(
                user = %user,
                extern_type = ?user.extern_type,
                expected = Self::NAME,
                "extern_type mismatch"
            );
            return Ok(AuthOutcome::Rejected(RejectReason::UnknownPrincipal));
        }
        if !user.active {
            warn!(user = %user, "User tried to authenticate but is disabled");
            return Ok(AuthOutcome::Rejected(RejectReason::AccountDisabled));
        }

        let identity = RawIdentity::from_user(user);
        if user.is_default_user() {
            info!(user = %user, "User authenticated as anonymous user");
            return Ok(AuthOutcome::Authenticated(identity));
        }

        let (matches, new_hash) = ctx.verify_password(request.password, &user.password_hash).await?;
        if user.username == request.username && matches {
            info!(user = %user, "User authenticated");
            let identity = match new_hash {
                Some(hash) => {
                    debug!(user = %user, "Password matched a deprecated hash, requesting migration");
                    identity.hash_migrate(hash)
                }
                None => identity,
            };
            return Ok(AuthOutcome::Authenticated(identity));
        }

        info!(user = %user, "User had a bad password on this plugin");
        Ok(AuthOutcome::Rejected(RejectReason::BadCredentials))
    }
}
