//! Container authentication from request headers set by a front-end proxy.

use async_trait::async_trait;
use auth_identity::{permissions, LocalUser};
use plugin_runtime_core::{
    lookup_user, AuthOutcome, AuthPlugin, AuthRequest, Environ, ExternalPolicy, PluginContext, PluginId,
    PluginSettings, RawIdentity, RejectReason, Result, SchemaNode, SettingsSchema,
};
use tracing::{debug, info};

pub struct HeadersPlugin {
    id: PluginId,
}

impl HeadersPlugin {
    pub const NAME: &'static str = "headers";

    pub fn new(id: impl Into<PluginId>) -> Self {
        Self { id: id.into() }
    }

    /// Strip the realm (`user@REALM`) and the domain (`DOMAIN\user`).
    pub fn clean_username(username: &str) -> &str {
        let without_realm = username.split('@').next().unwrap_or(username);
        without_realm.rsplit('\\').next().unwrap_or(without_realm)
    }

    /// Username carried by the request, per the configured headers.
    pub fn username_from_environ(environ: Option<&Environ>, settings: Option<&PluginSettings>) -> Option<String> {
        let environ = environ?;
        let settings = settings.cloned().unwrap_or_default();

        let lookup = |setting: &str| -> Option<String> {
            let header = settings.get_str(setting);
            if header.is_empty() {
                return None;
            }
            let value = environ.get(&header).filter(|v| !v.is_empty()).cloned();
            debug!(header = %header, found = value.is_some(), "Checked header for username");
            value
        };

        let username = lookup("header").or_else(|| lookup("fallback_header"))?;
        if settings.get_bool("clean_username") {
            let cleaned = Self::clean_username(&username).to_string();
            debug!(received = %username, cleaned = %cleaned, "Cleaned username from headers");
            return Some(cleaned).filter(|u| !u.is_empty());
        }
        Some(username)
    }
}

#[async_trait]
impl AuthPlugin for HeadersPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "Headers"
    }

    fn is_container_auth(&self) -> bool {
        true
    }

    fn settings_schema(&self) -> SettingsSchema {
        SettingsSchema::base()
            .with_node(
                SchemaNode::string("header", "REMOTE_USER")
                    .titled("Header")
                    .described("Header to extract the user from"),
            )
            .with_node(
                SchemaNode::string("fallback_header", "HTTP_X_FORWARDED_USER")
                    .titled("Fallback header")
                    .described("Header to extract the user from when main one fails"),
            )
            .with_node(
                SchemaNode::boolean("clean_username", true)
                    .titled("Clean username")
                    .described("Perform cleaning of user, if passed user has @ in username then first part before @ is taken. If there's \\ in the username only the part after \\ is taken"),
            )
    }

    fn external_policy(&self) -> Option<ExternalPolicy> {
        Some(ExternalPolicy::default())
    }

    /// Resolve the user named by the request headers; the username argument
    /// is ignored.
    async fn get_user(
        &self,
        ctx: &PluginContext,
        _username: &str,
        environ: Option<&Environ>,
        settings: Option<&PluginSettings>,
    ) -> Result<Option<LocalUser>> {
        match Self::username_from_environ(environ, settings) {
            Some(username) => lookup_user(ctx, &username).await,
            None => Ok(None),
        }
    }

    async fn user_activation_state(&self, ctx: &PluginContext) -> Result<bool> {
        ctx.has_default_permission(permissions::EXTERN_ACTIVATE_AUTO).await
    }

    async fn auth(&self, ctx: &PluginContext, request: &AuthRequest<'_>) -> Result<AuthOutcome> {
        let Some(environ) = request.environ.filter(|e| !e.is_empty()) else {
            debug!("Empty environ, skipping");
            return Ok(AuthOutcome::Rejected(RejectReason::NoIdentity));
        };

        let resolved;
        let user = match request.user {
            Some(user) => Some(user),
            None => {
                resolved = self.get_user(ctx, "", Some(environ), Some(request.settings)).await?;
                resolved.as_ref()
            }
        };

        let username = match user {
            Some(user) => Some(user.username.clone()),
            None => Self::username_from_environ(Some(environ), Some(request.settings)),
        };
        let Some(username) = username else {
            return Ok(AuthOutcome::Rejected(RejectReason::NoIdentity));
        };

        let firstname = user.map(|u| u.firstname.clone()).filter(|f| !f.is_empty());
        let identity = RawIdentity::new()
            .username(&username)
            .firstname(firstname.unwrap_or_else(|| username.clone()))
            .lastname(user.map(|u| u.lastname.clone()).unwrap_or_default())
            .groups(Vec::<String>::new())
            .email(user.map(|u| u.email.clone()).unwrap_or_default())
            .admin(user.is_some_and(|u| u.admin))
            .active(user.map_or(true, |u| u.active))
            .active_from_extern(Some(true))
            .extern_name(&username)
            .extern_type(user.and_then(|u| u.extern_type.clone()).unwrap_or_default());

        info!(user = %username, "User authenticated from headers");
        Ok(AuthOutcome::Authenticated(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(clean: bool) -> PluginSettings {
        PluginSettings::new()
            .with("header", "REMOTE_USER")
            .with("fallback_header", "HTTP_X_FORWARDED_USER")
            .with("clean_username", clean)
    }

    fn environ(pairs: &[(&str, &str)]) -> Environ {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_clean_username() {
        assert_eq!(HeadersPlugin::clean_username("bob@EXAMPLE.COM"), "bob");
        assert_eq!(HeadersPlugin::clean_username("CORP\\bob"), "bob");
        assert_eq!(HeadersPlugin::clean_username("CORP\\bob@realm"), "bob");
        assert_eq!(HeadersPlugin::clean_username("bob"), "bob");
    }

    #[test]
    fn test_main_header_wins() {
        let env = environ(&[("REMOTE_USER", "bob"), ("HTTP_X_FORWARDED_USER", "mallory")]);
        assert_eq!(
            HeadersPlugin::username_from_environ(Some(&env), Some(&settings(true))).as_deref(),
            Some("bob")
        );
    }

    #[test]
    fn test_fallback_header() {
        let env = environ(&[("HTTP_X_FORWARDED_USER", "CORP\\carol")]);
        assert_eq!(
            HeadersPlugin::username_from_environ(Some(&env), Some(&settings(true))).as_deref(),
            Some("carol")
        );
        assert_eq!(
            HeadersPlugin::username_from_environ(Some(&env), Some(&settings(false))).as_deref(),
            Some("CORP\\carol")
        );
    }

    #[test]
    fn test_no_header_no_user() {
        let env = environ(&[("HTTP_HOST", "example.com")]);
        assert!(HeadersPlugin::username_from_environ(Some(&env), Some(&settings(true))).is_none());
        assert!(HeadersPlugin::username_from_environ(None, Some(&settings(true))).is_none());
    }
}
