//! VCS authentication with per-user auth tokens in place of the password.

use async_trait::async_trait;
use auth_identity::{permissions, TokenRole};
use crypto::secrets_match;
use plugin_runtime_core::{
    AcceptanceRules, AttemptContext, AuthOutcome, AuthPlugin, AuthRequest, Channel, PluginContext, PluginId,
    RawIdentity, RejectReason, Result,
};
use tracing::{error, info, warn};

pub struct AuthTokenPlugin {
    id: PluginId,
}

impl AuthTokenPlugin {
    pub const NAME: &'static str = "authtoken";

    pub fn new(id: impl Into<PluginId>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl AuthPlugin for AuthTokenPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "Rhodecode Token Auth"
    }

    /// Existing users only, over VCS only, owned by this plugin or by any
    /// plugin taking part in the attempt.
    fn acceptance_rules(&self, attempt: &AttemptContext) -> AcceptanceRules {
        let mut allowed = vec![Self::NAME.to_string()];
        allowed.extend(
            attempt
                .active_plugin_names
                .iter()
                .filter(|name| name.as_str() != Self::NAME)
                .cloned(),
        );
        AcceptanceRules::default()
            .existing_users_only()
            .for_plugins(allowed)
            .for_channels(vec![Channel::Vcs])
    }

    async fn user_activation_state(&self, ctx: &PluginContext) -> Result<bool> {
        ctx.has_default_permission(permissions::REGISTER_AUTO_ACTIVATE).await
    }

    async fn auth(&self, ctx: &PluginContext, request: &AuthRequest<'_>) -> Result<AuthOutcome> {
        let Some(user) = request.user else {
            return Ok(AuthOutcome::Rejected(RejectReason::UnknownPrincipal));
        };
        if !user.active {
            warn!(user = %request.username, plugin = Self::NAME, "Account not active");
            return Ok(AuthOutcome::Rejected(RejectReason::AccountDisabled));
        }

        let tokens = ctx.users.valid_auth_tokens(user, TokenRole::Vcs).await?;
        if user.username == request.username && tokens.iter().any(|t| secrets_match(request.password, t)) {
            info!(user = %user.username, plugin = Self::NAME, "User authenticated");
            return Ok(AuthOutcome::Authenticated(RawIdentity::from_user(user)));
        }

        error!(user = %request.username, plugin = Self::NAME, "Bad or inactive token");
        Ok(AuthOutcome::Rejected(RejectReason::BadCredentials))
    }
}
