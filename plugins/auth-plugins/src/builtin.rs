//! The closed set of plugins shipped with the engine.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth_identity::LocalUser;
use plugin_runtime_core::{
    AcceptanceRules, AttemptContext, AuthOutcome, AuthPlugin, AuthRequest, Environ, ExternalPolicy, PluginContext,
    PluginId, PluginSettings, Result, SettingsSchema,
};
use thiserror::Error;

use crate::authtoken::AuthTokenPlugin;
use crate::cas::{CasClient, HttpCasClient, JasigCasPlugin};
use crate::crowd::{CrowdClient, CrowdPlugin, HttpCrowdClient};
use crate::headers::HeadersPlugin;
use crate::ldap::{LdapConnector, LdapPlugin, StaticDirectory};
use crate::pam::{PamPlugin, PamService, StaticPamService, StaticUserDb, SystemUserDb};
use crate::rhodecode::RhodeCodePlugin;
use crate::source::SourceError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown plugin kind: {0}")]
pub struct UnknownPluginKind(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    RhodeCode,
    AuthToken,
    Headers,
    Ldap,
    Pam,
    Crowd,
    JasigCas,
}

impl PluginKind {
    pub const ALL: [PluginKind; 7] = [
        PluginKind::RhodeCode,
        PluginKind::AuthToken,
        PluginKind::Headers,
        PluginKind::Ldap,
        PluginKind::Pam,
        PluginKind::Crowd,
        PluginKind::JasigCas,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PluginKind::RhodeCode => RhodeCodePlugin::NAME,
            PluginKind::AuthToken => AuthTokenPlugin::NAME,
            PluginKind::Headers => HeadersPlugin::NAME,
            PluginKind::Ldap => LdapPlugin::NAME,
            PluginKind::Pam => PamPlugin::NAME,
            PluginKind::Crowd => CrowdPlugin::NAME,
            PluginKind::JasigCas => JasigCasPlugin::NAME,
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PluginKind {
    type Err = UnknownPluginKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownPluginKind(s.to_string()))
    }
}

/// Identity-source clients handed to the plugins that need one.
#[derive(Clone)]
pub struct PluginSources {
    pub ldap: Arc<dyn LdapConnector>,
    pub pam: Arc<dyn PamService>,
    pub user_db: Arc<dyn SystemUserDb>,
    pub crowd: Arc<dyn CrowdClient>,
    pub cas: Arc<dyn CasClient>,
}

impl PluginSources {
    /// HTTP clients for CROWD and CAS, in-memory directory, PAM and user
    /// database until real ones are supplied with the `with_*` methods.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(http_timeout: Duration) -> std::result::Result<Self, SourceError> {
        Ok(Self {
            ldap: Arc::new(StaticDirectory::new()),
            pam: Arc::new(StaticPamService::new()),
            user_db: Arc::new(StaticUserDb::default()),
            crowd: Arc::new(HttpCrowdClient::new(http_timeout)?),
            cas: Arc::new(HttpCasClient::new(http_timeout)?),
        })
    }

    pub fn with_ldap(mut self, connector: Arc<dyn LdapConnector>) -> Self {
        self.ldap = connector;
        self
    }

    pub fn with_pam(mut self, service: Arc<dyn PamService>, user_db: Arc<dyn SystemUserDb>) -> Self {
        self.pam = service;
        self.user_db = user_db;
        self
    }

    pub fn with_crowd(mut self, client: Arc<dyn CrowdClient>) -> Self {
        self.crowd = client;
        self
    }

    pub fn with_cas(mut self, client: Arc<dyn CasClient>) -> Self {
        self.cas = client;
        self
    }
}

impl fmt::Debug for PluginSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSources").finish_non_exhaustive()
    }
}

pub enum BuiltinPlugin {
    RhodeCode(RhodeCodePlugin),
    AuthToken(AuthTokenPlugin),
    Headers(HeadersPlugin),
    Ldap(LdapPlugin),
    Pam(PamPlugin),
    Crowd(CrowdPlugin),
    JasigCas(JasigCasPlugin),
}

impl BuiltinPlugin {
    pub fn build(kind: PluginKind, id: impl Into<PluginId>, sources: &PluginSources) -> Self {
        match kind {
            PluginKind::RhodeCode => Self::RhodeCode(RhodeCodePlugin::new(id)),
            PluginKind::AuthToken => Self::AuthToken(AuthTokenPlugin::new(id)),
            PluginKind::Headers => Self::Headers(HeadersPlugin::new(id)),
            PluginKind::Ldap => Self::Ldap(LdapPlugin::new(id, Arc::clone(&sources.ldap))),
            PluginKind::Pam => Self::Pam(PamPlugin::new(
                id,
                Arc::clone(&sources.pam),
                Arc::clone(&sources.user_db),
            )),
            PluginKind::Crowd => Self::Crowd(CrowdPlugin::new(id, Arc::clone(&sources.crowd))),
            PluginKind::JasigCas => Self::JasigCas(JasigCasPlugin::new(id, Arc::clone(&sources.cas))),
        }
    }

    /// Every builtin plugin, registered under its own name.
    pub fn all(sources: &PluginSources) -> Vec<Self> {
        PluginKind::ALL
            .into_iter()
            .map(|kind| Self::build(kind, kind.name(), sources))
            .collect()
    }

    pub fn kind(&self) -> PluginKind {
        match self {
            Self::RhodeCode(_) => PluginKind::RhodeCode,
            Self::AuthToken(_) => PluginKind::AuthToken,
            Self::Headers(_) => PluginKind::Headers,
            Self::Ldap(_) => PluginKind::Ldap,
            Self::Pam(_) => PluginKind::Pam,
            Self::Crowd(_) => PluginKind::Crowd,
            Self::JasigCas(_) => PluginKind::JasigCas,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $plugin:ident => $call:expr) => {
        match $self {
            BuiltinPlugin::RhodeCode($plugin) => $call,
            BuiltinPlugin::AuthToken($plugin) => $call,
            BuiltinPlugin::Headers($plugin) => $call,
            BuiltinPlugin::Ldap($plugin) => $call,
            BuiltinPlugin::Pam($plugin) => $call,
            BuiltinPlugin::Crowd($plugin) => $call,
            BuiltinPlugin::JasigCas($plugin) => $call,
        }
    };
}

#[async_trait]
impl AuthPlugin for BuiltinPlugin {
    fn id(&self) -> &PluginId {
        dispatch!(self, p => p.id())
    }

    fn name(&self) -> &'static str {
        dispatch!(self, p => p.name())
    }

    fn display_name(&self) -> &'static str {
        dispatch!(self, p => p.display_name())
    }

    fn is_container_auth(&self) -> bool {
        dispatch!(self, p => p.is_container_auth())
    }

    fn auth_cache_ttl(&self) -> Option<u64> {
        dispatch!(self, p => p.auth_cache_ttl())
    }

    fn settings_schema(&self) -> SettingsSchema {
        dispatch!(self, p => p.settings_schema())
    }

    fn acceptance_rules(&self, attempt: &AttemptContext) -> AcceptanceRules {
        dispatch!(self, p => p.acceptance_rules(attempt))
    }

    fn external_policy(&self) -> Option<ExternalPolicy> {
        dispatch!(self, p => p.external_policy())
    }

    async fn get_user(
        &self,
        ctx: &PluginContext,
        username: &str,
        environ: Option<&Environ>,
        settings: Option<&PluginSettings>,
    ) -> Result<Option<LocalUser>> {
        dispatch!(self, p => p.get_user(ctx, username, environ, settings).await)
    }

    async fn user_activation_state(&self, ctx: &PluginContext) -> Result<bool> {
        dispatch!(self, p => p.user_activation_state(ctx).await)
    }

    async fn auth(&self, ctx: &PluginContext, request: &AuthRequest<'_>) -> Result<AuthOutcome> {
        dispatch!(self, p => p.auth(ctx, request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> PluginSources {
        PluginSources::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in PluginKind::ALL {
            assert_eq!(kind.name().parse::<PluginKind>().unwrap(), kind);
        }
        assert_eq!("jasig-cas".parse::<PluginKind>().unwrap(), PluginKind::JasigCas);
        assert!("kerberos".parse::<PluginKind>().is_err());
    }

    #[test]
    fn test_all_builtins() {
        let plugins = BuiltinPlugin::all(&sources());
        assert_eq!(plugins.len(), PluginKind::ALL.len());
        for plugin in &plugins {
            assert_eq!(plugin.id().as_str(), plugin.name());
            assert_eq!(plugin.kind().name(), plugin.name());
        }
    }

    #[test]
    fn test_builtin_capabilities() {
        let sources = sources();
        let headers = BuiltinPlugin::build(PluginKind::Headers, "headers", &sources);
        assert!(headers.is_container_auth());
        assert!(headers.allows_creating_users());

        let rhodecode = BuiltinPlugin::build(PluginKind::RhodeCode, "rhodecode", &sources);
        assert!(!rhodecode.is_container_auth());
        assert!(rhodecode.external_policy().is_none());

        let pam = BuiltinPlugin::build(PluginKind::Pam, "pam", &sources);
        assert_eq!(pam.auth_cache_ttl(), Some(4));
        assert!(pam.settings_schema().node("gecos").is_some());

        let ldap = BuiltinPlugin::build(PluginKind::Ldap, "corp-ldap", &sources);
        assert_eq!(ldap.id().as_str(), "corp-ldap");
        assert_eq!(ldap.name(), "ldap");
        assert!(ldap.settings_schema().is_encrypted("dn_pass"));
    }
}
