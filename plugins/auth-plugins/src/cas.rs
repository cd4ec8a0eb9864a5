//! Jasig CAS plugin: credentials are posted to the CAS REST ticket endpoint
//! and any ticket-granting answer counts as success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth_identity::permissions;
#[cfg(test)]
use mockall::automock;
use plugin_runtime_core::{
    AuthOutcome, AuthPlugin, AuthRequest, ExternalPolicy, PluginContext, PluginId, RawIdentity, RejectReason, Result,
    SchemaNode, SettingsSchema,
};
use reqwest::Client;
use tracing::{debug, info};

use crate::source::{SourceError, USER_AGENT};

pub const DEFAULT_SERVICE_URL: &str = "https://domain.com/cas/v1/tickets";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CasClient: Send + Sync {
    /// `Ok(true)` when CAS issued a ticket for the credentials.
    async fn request_ticket(
        &self,
        service_url: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<bool, SourceError>;
}

/// `reqwest` implementation of [`CasClient`].
#[derive(Debug, Clone)]
pub struct HttpCasClient {
    client: Client,
}

impl HttpCasClient {
    /// # Errors
    ///
    /// Returns `SourceError::Protocol` if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> std::result::Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CasClient for HttpCasClient {
    async fn request_ticket(
        &self,
        service_url: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<bool, SourceError> {
        let response = self
            .client
            .post(service_url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, "HTTP error when requesting Jasig CAS");
        }
        Ok(status.is_success())
    }
}

pub struct JasigCasPlugin {
    id: PluginId,
    client: Arc<dyn CasClient>,
}

impl JasigCasPlugin {
    pub const NAME: &'static str = "jasig-cas";

    pub fn new(id: impl Into<PluginId>, client: Arc<dyn CasClient>) -> Self {
        Self {
            id: id.into(),
            client,
        }
    }
}

#[async_trait]
impl AuthPlugin for JasigCasPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "Jasig-CAS"
    }

    fn is_container_auth(&self) -> bool {
        true
    }

    fn settings_schema(&self) -> SettingsSchema {
        SettingsSchema::base().with_node(
            SchemaNode::string("service_url", DEFAULT_SERVICE_URL)
                .titled("URL")
                .described("The url of the Jasig CAS REST service"),
        )
    }

    fn external_policy(&self) -> Option<ExternalPolicy> {
        Some(ExternalPolicy::default())
    }

    async fn user_activation_state(&self, ctx: &PluginContext) -> Result<bool> {
        ctx.has_default_permission(permissions::EXTERN_ACTIVATE_AUTO).await
    }

    async fn auth(&self, _ctx: &PluginContext, request: &AuthRequest<'_>) -> Result<AuthOutcome> {
        if request.username.is_empty() || request.password.is_empty() {
            debug!("Empty username or password, skipping");
            return Ok(AuthOutcome::Rejected(RejectReason::MalformedCredentials));
        }

        let url = request.settings.get_str("service_url");
        debug!(url = %url, user = %request.username, "Sending Jasig CAS ticket request");
        match self.client.request_ticket(&url, request.username, request.password).await {
            Ok(true) => {}
            Ok(false) => return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials)),
            Err(e) => {
                debug!(url = %url, error = %e, "Error when requesting Jasig CAS");
                return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials));
            }
        }

        let user = request.user;
        let username = user.map_or(request.username, |u| u.username.as_str());
        let firstname = user
            .map(|u| u.firstname.clone())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| username.to_string());

        let identity = RawIdentity::new()
            .username(username)
            .firstname(firstname)
            .lastname(user.map(|u| u.lastname.clone()).unwrap_or_default())
            .groups(Vec::<String>::new())
            .email(user.map(|u| u.email.clone()).unwrap_or_default())
            .admin(user.is_some_and(|u| u.admin))
            .active(user.map_or(true, |u| u.active))
            .active_from_extern(Some(true))
            .extern_name(username)
            .extern_type(user.and_then(|u| u.extern_type.clone()).unwrap_or_default());

        info!(user = %username, "User authenticated against Jasig CAS");
        Ok(AuthOutcome::Authenticated(identity))
    }
}
