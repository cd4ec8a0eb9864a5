//! LDAP directory plugin
//!
//! The directory protocol lives behind [`LdapConnector`]; this module owns
//! the settings, filter construction, dynamic bind and attribute mapping.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use auth_identity::permissions;
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use plugin_runtime_core::{
    AuthOutcome, AuthPlugin, AuthRequest, ExternalPolicy, PluginContext, PluginId, PluginSettings, RawIdentity,
    RejectReason, Result, SchemaNode, SettingsSchema, Validator,
};
use tracing::{debug, info, warn};

use crate::source::SourceError;

/// Marker in `dn_user` replaced by the login name for per-user binds.
pub const DYNAMIC_BIND_VAR: &str = "$login";

pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_LDAPS_PORT: u16 = 636;

const TLS_KINDS: [&str; 3] = ["PLAIN", "LDAPS", "START_TLS"];
const TLS_REQCERTS: [&str; 5] = ["NEVER", "ALLOW", "TRY", "DEMAND", "HARD"];
const SEARCH_SCOPES: [&str; 3] = ["BASE", "ONELEVEL", "SUBTREE"];

/// Attributes of a directory entry, multi-valued.
pub type LdapAttributes = HashMap<String, Vec<String>>;

/// Connection parameters derived from the plugin settings for one attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct LdapConfig {
    /// Comma separated host list
    pub hosts: Vec<String>,
    pub port: u16,
    pub tls_kind: String,
    pub tls_reqcert: String,
    pub bind_dn: String,
    pub bind_pass: String,
    pub base_dn: String,
    pub search_scope: String,
    pub attr_login: String,
    pub filter: String,
}

impl LdapConfig {
    pub fn from_settings(settings: &PluginSettings) -> Self {
        let tls_kind = settings.get_str("tls_kind");
        let configured_port = settings
            .get_int("port")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        let port = match (tls_kind.as_str(), configured_port) {
            ("LDAPS", 0) => DEFAULT_LDAPS_PORT,
            _ => configured_port,
        };
        Self {
            hosts: settings
                .get_str("host")
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect(),
            port,
            tls_kind,
            tls_reqcert: settings.get_str("tls_reqcert"),
            bind_dn: settings.get_str("dn_user"),
            bind_pass: settings.get_str("dn_pass"),
            base_dn: settings.get_str("base_dn"),
            search_scope: settings.get_str("search_scope"),
            attr_login: settings.get_str("attr_login"),
            filter: settings.get_str("filter"),
        }
    }

    /// `ldap://` or `ldaps://` URIs, one per host.
    pub fn server_uris(&self) -> Vec<String> {
        let scheme = if self.tls_kind == "LDAPS" { "ldaps" } else { "ldap" };
        self.hosts
            .iter()
            .map(|host| format!("{}://{}:{}", scheme, host, self.port))
            .collect()
    }

    /// Search filter for `username` within the configured filter.
    pub fn user_filter(&self, username: &str) -> String {
        format!("(&{}({}={}))", self.filter, self.attr_login, username)
    }

    /// Bind as the logging-in user when `dn_user` carries the login marker
    /// and no bind password is configured.
    pub fn with_dynamic_bind(mut self, username: &str, password: &str) -> Self {
        if !self.bind_dn.is_empty() && self.bind_dn.contains(DYNAMIC_BIND_VAR) && self.bind_pass.is_empty() {
            debug!("Using dynamic user/password binding for LDAP authentication");
            self.bind_dn = self.bind_dn.replace(DYNAMIC_BIND_VAR, username);
            self.bind_pass = password.to_string();
        }
        self
    }
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("hosts", &self.hosts)
            .field("port", &self.port)
            .field("tls_kind", &self.tls_kind)
            .field("bind_dn", &self.bind_dn)
            .field("base_dn", &self.base_dn)
            .field("search_scope", &self.search_scope)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Directory operations the plugin needs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Bind with the service account (if any) and return the DNs matching
    /// `filter` under the configured base and scope.
    async fn search(&self, config: &LdapConfig, filter: &str) -> std::result::Result<Vec<String>, SourceError>;

    /// Simple bind as `dn`; `Ok(None)` when the directory rejects the
    /// password, otherwise the entry's attributes.
    async fn bind_and_fetch(
        &self,
        config: &LdapConfig,
        dn: &str,
        password: &str,
    ) -> std::result::Result<Option<LdapAttributes>, SourceError>;
}

#[derive(Debug, Clone)]
struct DirectoryEntry {
    attributes: LdapAttributes,
    password: String,
}

/// In-memory directory, for local setups and tests. Filters are matched on
/// the login attribute only.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Arc<RwLock<HashMap<String, DirectoryEntry>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, dn: &str, password: &str, attributes: LdapAttributes) {
        self.entries.write().insert(
            dn.to_string(),
            DirectoryEntry {
                attributes,
                password: password.to_string(),
            },
        );
    }
}

#[async_trait]
impl LdapConnector for StaticDirectory {
    async fn search(&self, config: &LdapConfig, filter: &str) -> std::result::Result<Vec<String>, SourceError> {
        let entries = self.entries.read();
        let mut dns: Vec<String> = entries
            .iter()
            .filter(|(dn, entry)| {
                dn.ends_with(&config.base_dn)
                    && entry
                        .attributes
                        .get(&config.attr_login)
                        .is_some_and(|values| {
                            values
                                .iter()
                                .any(|v| filter.ends_with(&format!("({}={}))", config.attr_login, v)))
                        })
            })
            .map(|(dn, _)| dn.clone())
            .collect();
        dns.sort();
        Ok(dns)
    }

    async fn bind_and_fetch(
        &self,
        _config: &LdapConfig,
        dn: &str,
        password: &str,
    ) -> std::result::Result<Option<LdapAttributes>, SourceError> {
        Ok(self
            .entries
            .read()
            .get(dn)
            .filter(|entry| entry.password == password)
            .map(|entry| entry.attributes.clone()))
    }
}

pub struct LdapPlugin {
    id: PluginId,
    connector: Arc<dyn LdapConnector>,
}

impl LdapPlugin {
    pub const NAME: &'static str = "ldap";

    pub fn new(id: impl Into<PluginId>, connector: Arc<dyn LdapConnector>) -> Self {
        Self {
            id: id.into(),
            connector,
        }
    }

    /// DN and attributes of the entry that accepted `password`.
    async fn authenticate_ldap(
        &self,
        config: &LdapConfig,
        username: &str,
        password: &str,
    ) -> std::result::Result<Option<(String, LdapAttributes)>, SourceError> {
        let filter = config.user_filter(username);
        debug!(base_dn = %config.base_dn, filter = %filter, servers = ?config.server_uris(), "Searching LDAP");

        let candidates = self.connector.search(config, &filter).await?;
        if candidates.is_empty() {
            debug!(user = %username, "LDAP says no such user");
            return Ok(None);
        }
        for dn in candidates {
            debug!(dn = %dn, "Trying simple bind");
            if let Some(attrs) = self.connector.bind_and_fetch(config, &dn, password).await? {
                return Ok(Some((dn, attrs)));
            }
            debug!(user = %username, dn = %dn, "LDAP rejected password");
        }
        Ok(None)
    }
}

fn first_value(attrs: &LdapAttributes, settings: &PluginSettings, setting: &str) -> Option<String> {
    let attr = settings.get_str(setting);
    attrs
        .get(&attr)
        .and_then(|values| values.first())
        .filter(|v| !v.is_empty())
        .cloned()
}

#[async_trait]
impl AuthPlugin for LdapPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "LDAP"
    }

    fn settings_schema(&self) -> SettingsSchema {
        SettingsSchema::base()
            .with_node(SchemaNode::string("host", "").titled("LDAP Host").described("Host of the LDAP Server"))
            .with_node(
                SchemaNode::int("port", i64::from(DEFAULT_PORT))
                    .titled("Port")
                    .described("Port that the LDAP server is listening on")
                    .validated(Validator::Range { min: 0, max: Some(65536) }),
            )
            .with_node(SchemaNode::string("dn_user", "").titled("Account").described("User to connect to LDAP"))
            .with_node(
                SchemaNode::string("dn_pass", "")
                    .titled("Password")
                    .described("Password to connect to LDAP")
                    .encrypted(),
            )
            .with_node(
                SchemaNode::string("tls_kind", "PLAIN")
                    .titled("Connection Security")
                    .validated(Validator::one_of(TLS_KINDS)),
            )
            .with_node(
                SchemaNode::string("tls_reqcert", "NEVER")
                    .titled("Certificate Checks")
                    .validated(Validator::one_of(TLS_REQCERTS)),
            )
            .with_node(
                SchemaNode::string("base_dn", "")
                    .titled("Base DN")
                    .described("Base DN to search (e.g., dc=mydomain,dc=com)"),
            )
            .with_node(
                SchemaNode::string("filter", "")
                    .titled("LDAP Search Filter")
                    .described("Filter to narrow results (e.g., ou=Users, etc)"),
            )
            .with_node(
                SchemaNode::string("search_scope", "BASE")
                    .titled("LDAP Search Scope")
                    .validated(Validator::one_of(SEARCH_SCOPES)),
            )
            .with_node(SchemaNode::string("attr_login", "").titled("Login Attribute"))
            .with_node(SchemaNode::string("attr_firstname", "").titled("First Name Attribute"))
            .with_node(SchemaNode::string("attr_lastname", "").titled("Last Name Attribute"))
            .with_node(SchemaNode::string("attr_email", "").titled("Email Attribute"))
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
        if request.username.contains(',') {
            warn!(user = %request.username, "Invalid character in username: ,");
            return Ok(AuthOutcome::Rejected(RejectReason::MalformedCredentials));
        }

        let config = LdapConfig::from_settings(request.settings).with_dynamic_bind(request.username, request.password);

        let (dn, attrs) = match self.authenticate_ldap(&config, request.username, request.password).await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials)),
            Err(SourceError::Unavailable(reason)) => {
                return Err(SourceError::Unavailable(reason).into_plugin_error(Self::NAME));
            }
            Err(e) => {
                warn!(error = %e, "LDAP related exception");
                return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials));
            }
        };
        debug!(dn = %dn, "Got LDAP DN response");

        let user = request.user;
        let settings = request.settings;
        let identity = RawIdentity::new()
            .username(user.map_or(request.username, |u| u.username.as_str()))
            .firstname(
                first_value(&attrs, settings, "attr_firstname")
                    .or_else(|| user.map(|u| u.firstname.clone()))
                    .unwrap_or_default(),
            )
            .lastname(
                first_value(&attrs, settings, "attr_lastname")
                    .or_else(|| user.map(|u| u.lastname.clone()))
                    .unwrap_or_default(),
            )
            .email(
                first_value(&attrs, settings, "attr_email")
                    .or_else(|| user.map(|u| u.email.clone()))
                    .unwrap_or_default(),
            )
            .groups(Vec::<String>::new())
            .admin(user.is_some_and(|u| u.admin))
            .active(user.map_or(true, |u| u.active))
            .active_from_extern(None)
            .extern_name(dn)
            .extern_type(user.and_then(|u| u.extern_type.clone()).unwrap_or_default());

        info!(user = %request.username, "User authenticated against LDAP");
        Ok(AuthOutcome::Authenticated(identity))
    }
}
