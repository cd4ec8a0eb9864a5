//! Atlassian CROWD plugin over the CROWD usermanagement REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth_identity::permissions;
#[cfg(test)]
use mockall::automock;
use plugin_runtime_core::{
    AuthOutcome, AuthPlugin, AuthRequest, ExternalPolicy, PluginContext, PluginId, PluginSettings, RawIdentity,
    RejectReason, Result, SchemaNode, SettingsSchema, Validator,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::source::{SourceError, USER_AGENT};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8095;
const API_VERSION: &str = "latest";

/// Where and as which application to talk to CROWD.
#[derive(Clone, PartialEq, Eq)]
pub struct CrowdServer {
    pub uri: String,
    pub app_name: String,
    pub app_password: String,
}

impl CrowdServer {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            uri: format!("http://{host}:{port}/crowd"),
            app_name: String::new(),
            app_password: String::new(),
        }
    }

    /// Point at an explicit base URI, e.g. a test server.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_credentials(mut self, app_name: impl Into<String>, app_password: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self.app_password = app_password.into();
        self
    }

    pub fn from_settings(settings: &PluginSettings) -> Self {
        let host = settings.get_str("host");
        let port = settings
            .get_int("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        Self::new(if host.is_empty() { DEFAULT_HOST } else { &host }, port)
            .with_credentials(settings.get_str("app_name"), settings.get_str("app_password"))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/rest/usermanagement/{}/{}", self.uri, API_VERSION, path)
    }
}

impl std::fmt::Debug for CrowdServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrowdServer")
            .field("uri", &self.uri)
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

/// User record returned by a successful CROWD authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdUser {
    pub name: String,
    #[serde(rename = "first-name", default)]
    pub first_name: String,
    #[serde(rename = "last-name", default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GroupList {
    #[serde(default)]
    groups: Vec<GroupRef>,
}

#[derive(Debug, Deserialize)]
struct GroupRef {
    name: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CrowdClient: Send + Sync {
    /// `Ok(None)` when CROWD refuses the credentials.
    async fn user_auth(
        &self,
        server: &CrowdServer,
        username: &str,
        password: &str,
    ) -> std::result::Result<Option<CrowdUser>, SourceError>;

    /// Nested group names of `username`.
    async fn user_groups(&self, server: &CrowdServer, username: &str) -> std::result::Result<Vec<String>, SourceError>;
}

/// `reqwest` implementation of [`CrowdClient`].
#[derive(Debug, Clone)]
pub struct HttpCrowdClient {
    client: Client,
}

impl HttpCrowdClient {
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

fn check_status(status: StatusCode) -> std::result::Result<bool, SourceError> {
    if status.is_server_error() {
        return Err(SourceError::Unavailable(format!("CROWD answered {status}")));
    }
    Ok(status.is_success())
}

#[async_trait]
impl CrowdClient for HttpCrowdClient {
    async fn user_auth(
        &self,
        server: &CrowdServer,
        username: &str,
        password: &str,
    ) -> std::result::Result<Option<CrowdUser>, SourceError> {
        let url = server.endpoint("authentication");
        debug!(url = %url, user = %username, "Sending CROWD authentication request");

        let response = self
            .client
            .post(&url)
            .basic_auth(&server.app_name, Some(&server.app_password))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("username", username)])
            .json(&serde_json::json!({ "value": password }))
            .send()
            .await?;

        if !check_status(response.status())? {
            debug!(status = %response.status(), "CROWD rejected authentication");
            return Ok(None);
        }
        let user = response.json::<CrowdUser>().await?;
        Ok(Some(user))
    }

    async fn user_groups(&self, server: &CrowdServer, username: &str) -> std::result::Result<Vec<String>, SourceError> {
        let url = server.endpoint("user/group/nested");
        let response = self
            .client
            .get(&url)
            .basic_auth(&server.app_name, Some(&server.app_password))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("username", username)])
            .send()
            .await?;

        if !check_status(response.status())? {
            warn!(status = %response.status(), user = %username, "CROWD group lookup failed");
            return Ok(Vec::new());
        }
        let list = response.json::<GroupList>().await?;
        Ok(list.groups.into_iter().map(|g| g.name).collect())
    }
}

pub struct CrowdPlugin {
    id: PluginId,
    client: Arc<dyn CrowdClient>,
}

impl CrowdPlugin {
    pub const NAME: &'static str = "crowd";

    pub fn new(id: impl Into<PluginId>, client: Arc<dyn CrowdClient>) -> Self {
        Self {
            id: id.into(),
            client,
        }
    }
}

#[async_trait]
impl AuthPlugin for CrowdPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "CROWD"
    }

    fn settings_schema(&self) -> SettingsSchema {
        SettingsSchema::base()
            .with_node(
                SchemaNode::string("host", DEFAULT_HOST)
                    .titled("Host")
                    .described("The FQDN or IP of the Atlassian CROWD Server"),
            )
            .with_node(
                SchemaNode::int("port", i64::from(DEFAULT_PORT))
                    .titled("Port")
                    .described("The Port in use by the Atlassian CROWD Server")
                    .validated(Validator::Range { min: 0, max: Some(65536) }),
            )
            .with_node(
                SchemaNode::string("app_name", "")
                    .titled("Application Name")
                    .described("The Application Name to authenticate to CROWD"),
            )
            .with_node(
                SchemaNode::string("app_password", "")
                    .titled("Application Password")
                    .described("The password to authenticate to CROWD")
                    .encrypted(),
            )
            .with_node(
                SchemaNode::string("admin_groups", "")
                    .titled("Admin Groups")
                    .described("A comma separated list of group names that identify users as administrators"),
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

        let server = CrowdServer::from_settings(request.settings);
        debug!(server = ?server, "Using CROWD server");

        let crowd_user = match self.client.user_auth(&server, request.username, request.password).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials)),
            Err(e @ SourceError::Unavailable(_)) => return Err(e.into_plugin_error(Self::NAME)),
            Err(e) => {
                warn!(error = %e, "Unexpected CROWD response");
                return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials));
            }
        };

        let groups = self
            .client
            .user_groups(&server, &crowd_user.name)
            .await
            .map_err(|e| e.into_plugin_error(Self::NAME))?;
        debug!(user = %crowd_user.name, groups = ?groups, "CROWD groups");

        let user = request.user;
        let admin_groups = request.settings.get_str("admin_groups");
        let in_admin_group = admin_groups
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .any(|g| groups.iter().any(|member_of| member_of == g));

        let or_existing = |value: &str, existing: Option<&String>| -> String {
            if value.is_empty() {
                existing.cloned().unwrap_or_default()
            } else {
                value.to_string()
            }
        };

        let identity = RawIdentity::new()
            .username(user.map_or(request.username, |u| u.username.as_str()))
            .firstname(or_existing(&crowd_user.first_name, user.map(|u| &u.firstname)))
            .lastname(or_existing(&crowd_user.last_name, user.map(|u| &u.lastname)))
            .email(or_existing(&crowd_user.email, user.map(|u| &u.email)))
            .groups(groups)
            .admin(in_admin_group || user.is_some_and(|u| u.admin))
            .active(user.map_or(true, |u| u.active))
            .active_from_extern(crowd_user.active)
            .extern_name(crowd_user.name.clone())
            .extern_type(user.and_then(|u| u.extern_type.clone()).unwrap_or_default());

        info!(user = %request.username, "User authenticated against CROWD");
        Ok(AuthOutcome::Authenticated(identity))
    }
}
