//! PAM plugin
//!
//! PAM conversations are slow, so this plugin pins a short cache lifetime in
//! code ([`PAM_CACHE_TTL_SECS`]) that overrides the `cache_ttl` setting.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use auth_identity::permissions;
#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;
use plugin_runtime_core::{
    AuthOutcome, AuthPlugin, AuthRequest, ContractError, ExternalPolicy, PluginContext, PluginId, RawIdentity,
    RejectReason, Result, SchemaNode, SettingsSchema,
};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::source::SourceError;

pub const PAM_CACHE_TTL_SECS: u64 = 4;

pub const DEFAULT_SERVICE: &str = "login";
pub const DEFAULT_GECOS_PATTERN: &str = r"(?P<last_name>.+),\s*(?P<first_name>\w+)";

/// PAM conversation for a username/password pair.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PamService: Send + Sync {
    async fn authenticate(&self, service: &str, username: &str, password: &str)
        -> std::result::Result<bool, SourceError>;
}

/// Host user and group databases.
#[cfg_attr(test, automock)]
pub trait SystemUserDb: Send + Sync {
    /// Names of the groups listing `username` as a member.
    fn groups_of(&self, username: &str) -> Vec<String>;

    /// GECOS field of the passwd entry, when the user exists.
    fn gecos(&self, username: &str) -> Option<String>;

    fn hostname(&self) -> String;
}

/// Fixed PAM accounts.
#[derive(Debug, Clone, Default)]
pub struct StaticPamService {
    accounts: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl StaticPamService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, service: &str, username: &str, password: &str) -> Self {
        self.accounts
            .write()
            .insert((service.to_string(), username.to_string()), password.to_string());
        self
    }
}

#[async_trait]
impl PamService for StaticPamService {
    async fn authenticate(
        &self,
        service: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<bool, SourceError> {
        Ok(self
            .accounts
            .read()
            .get(&(service.to_string(), username.to_string()))
            .is_some_and(|stored| stored == password))
    }
}

/// In-memory passwd/group tables.
#[derive(Debug, Clone)]
pub struct StaticUserDb {
    hostname: String,
    gecos: HashMap<String, String>,
    groups: HashMap<String, BTreeSet<String>>,
}

impl StaticUserDb {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            gecos: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    pub fn with_gecos(mut self, username: &str, gecos: &str) -> Self {
        self.gecos.insert(username.to_string(), gecos.to_string());
        self
    }

    pub fn with_group<I, S>(mut self, group: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .entry(group.to_string())
            .or_default()
            .extend(members.into_iter().map(Into::into));
        self
    }
}

impl Default for StaticUserDb {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl SystemUserDb for StaticUserDb {
    fn groups_of(&self, username: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, members)| members.contains(username))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn gecos(&self, username: &str) -> Option<String> {
        self.gecos.get(username).cloned()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

/// First and last name pulled out of a GECOS field.
pub fn names_from_gecos(pattern: &str, gecos: &str) -> std::result::Result<Option<(String, String)>, ContractError> {
    let regex = Regex::new(pattern).map_err(|e| ContractError::InvalidSetting {
        setting: "gecos".to_string(),
        reason: e.to_string(),
    })?;
    Ok(regex.captures(gecos).and_then(|caps| {
        let first = caps.name("first_name")?.as_str().to_string();
        let last = caps.name("last_name")?.as_str().to_string();
        Some((first, last))
    }))
}

pub struct PamPlugin {
    id: PluginId,
    service: Arc<dyn PamService>,
    user_db: Arc<dyn SystemUserDb>,
}

impl PamPlugin {
    pub const NAME: &'static str = "pam";

    pub fn new(id: impl Into<PluginId>, service: Arc<dyn PamService>, user_db: Arc<dyn SystemUserDb>) -> Self {
        Self {
            id: id.into(),
            service,
            user_db,
        }
    }
}

#[async_trait]
impl AuthPlugin for PamPlugin {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn display_name(&self) -> &'static str {
        "PAM"
    }

    fn auth_cache_ttl(&self) -> Option<u64> {
        Some(PAM_CACHE_TTL_SECS)
    }

    fn settings_schema(&self) -> SettingsSchema {
        SettingsSchema::base()
            .with_node(
                SchemaNode::string("service", DEFAULT_SERVICE)
                    .titled("PAM service name")
                    .described("PAM service name to use for authentication."),
            )
            .with_node(
                SchemaNode::string("gecos", DEFAULT_GECOS_PATTERN)
                    .titled("Gecos Regex")
                    .described("Regular expression for extracting user name/email etc. from Unix userinfo."),
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

        let service = request.settings.get_str("service");
        let accepted = self
            .service
            .authenticate(&service, request.username, request.password)
            .await
            .map_err(|e| e.into_plugin_error(Self::NAME))?;
        if !accepted {
            error!(user = %request.username, "PAM was unable to authenticate user");
            return Ok(AuthOutcome::Rejected(RejectReason::BadCredentials));
        }

        let user = request.user;
        let username = user.map_or(request.username, |u| u.username.as_str());
        let default_email = format!("{}@{}", request.username, self.user_db.hostname());
        let email = user
            .map(|u| u.email.clone())
            .filter(|e| !e.is_empty())
            .unwrap_or(default_email);

        let mut firstname = user.map(|u| u.firstname.clone()).unwrap_or_default();
        let mut lastname = user.map(|u| u.lastname.clone()).unwrap_or_default();
        match self.user_db.gecos(username) {
            Some(gecos) => match names_from_gecos(&request.settings.get_str("gecos"), &gecos) {
                Ok(Some((first, last))) => {
                    firstname = first;
                    lastname = last;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Cannot extract additional info for PAM user"),
            },
            None => warn!(user = %username, "Cannot extract additional info for PAM user"),
        }

        let identity = RawIdentity::new()
            .username(username)
            .firstname(firstname)
            .lastname(lastname)
            .groups(self.user_db.groups_of(username))
            .email(email)
            .admin(user.is_some_and(|u| u.admin))
            .active(user.map_or(true, |u| u.active))
            .active_from_extern(None)
            .extern_name(username)
            .extern_type(user.and_then(|u| u.extern_type.clone()).unwrap_or_default());

        info!(user = %username, "User authenticated against PAM");
        Ok(AuthOutcome::Authenticated(identity))
    }
}

#[cfg(test)]
mod tests {
    use auth_identity::{InMemoryUserRepository, LocalUser};
    use config_engine::InMemorySettingsStore;
    use crypto::{Argon2Params, UpgradingHasher};
    use plugin_runtime_core::{AuthRequest, Channel, PluginError, PluginSettings};

    use super::*;

    fn context() -> PluginContext {
        PluginContext::new(
            Arc::new(InMemorySettingsStore::ephemeral().unwrap()),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(UpgradingHasher::new(Argon2Params::for_testing())),
        )
    }

    fn settings() -> PluginSettings {
        PluginSettings::new()
            .with("service", "login")
            .with("gecos", DEFAULT_GECOS_PATTERN)
    }

    fn request<'a>(user: Option<&'a LocalUser>, password: &'a str, settings: &'a PluginSettings) -> AuthRequest<'a> {
        AuthRequest {
            user,
            username: "alice",
            password,
            settings,
            environ: None,
            channel: Channel::Vcs,
        }
    }

    fn user_db() -> MockSystemUserDb {
        let mut db = MockSystemUserDb::new();
        db.expect_hostname().return_const("build01".to_string());
        db.expect_groups_of().returning(|_| vec!["wheel".to_string()]);
        db
    }

    #[test]
    fn test_names_from_gecos() {
        let names = names_from_gecos(DEFAULT_GECOS_PATTERN, "Doe, John").unwrap();
        assert_eq!(names, Some(("John".to_string(), "Doe".to_string())));
        assert_eq!(names_from_gecos(DEFAULT_GECOS_PATTERN, "John Doe").unwrap(), None);
    }

    #[test]
    fn test_bad_gecos_pattern() {
        assert!(matches!(
            names_from_gecos("(?P<first_name", "Doe, John"),
            Err(ContractError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_static_user_db_groups() {
        let db = StaticUserDb::new("build01")
            .with_group("wheel", ["alice"])
            .with_group("devs", ["alice", "bob"]);
        assert_eq!(db.groups_of("alice"), vec!["devs", "wheel"]);
        assert_eq!(db.groups_of("bob"), vec!["devs"]);
        assert!(db.groups_of("carol").is_empty());
        assert_eq!(db.hostname(), "build01");
    }

    #[tokio::test]
    async fn test_static_pam_service() {
        let pam = StaticPamService::new().with_account("login", "alice", "secret");
        assert!(pam.authenticate("login", "alice", "secret").await.unwrap());
        assert!(!pam.authenticate("login", "alice", "nope").await.unwrap());
        assert!(!pam.authenticate("sshd", "alice", "secret").await.unwrap());
    }

    #[tokio::test]
    async fn test_plugin_builds_identity_from_host_databases() {
        let mut pam = MockPamService::new();
        pam.expect_authenticate()
            .withf(|service, user, pw| service == "login" && user == "alice" && pw == "secret")
            .times(1)
            .returning(|_, _, _| Ok(true));
        let mut db = user_db();
        db.expect_gecos().returning(|_| Some("Liddell, Alice".to_string()));

        let plugin = PamPlugin::new("pam", Arc::new(pam), Arc::new(db));
        let settings = settings();
        let outcome = plugin.auth(&context(), &request(None, "secret", &settings)).await.unwrap();

        let AuthOutcome::Authenticated(raw) = outcome else {
            panic!("expected authentication, got {outcome:?}");
        };
        let attrs = raw.validate("pam").unwrap();
        assert_eq!(attrs.firstname, "Alice");
        assert_eq!(attrs.lastname, "Liddell");
        assert_eq!(attrs.email, "alice@build01");
        assert!(attrs.groups.contains("wheel"));
        assert_eq!(attrs.extern_name, "alice");
        assert_eq!(attrs.active_from_extern, None);
    }

    #[tokio::test]
    async fn test_plugin_keeps_local_email() {
        let mut pam = MockPamService::new();
        pam.expect_authenticate().returning(|_, _, _| Ok(true));
        let mut db = user_db();
        db.expect_gecos().returning(|_| None);

        let local = LocalUser::new(3, "alice")
            .with_email("alice@corp.example")
            .with_names("Al", "L");
        let plugin = PamPlugin::new("pam", Arc::new(pam), Arc::new(db));
        let settings = settings();
        let outcome = plugin
            .auth(&context(), &request(Some(&local), "secret", &settings))
            .await
            .unwrap();

        let AuthOutcome::Authenticated(raw) = outcome else {
            panic!("expected authentication, got {outcome:?}");
        };
        let attrs = raw.validate("pam").unwrap();
        assert_eq!(attrs.email, "alice@corp.example");
        assert_eq!(attrs.firstname, "Al");
    }

    #[tokio::test]
    async fn test_plugin_rejections() {
        let mut pam = MockPamService::new();
        pam.expect_authenticate().times(1).returning(|_, _, _| Ok(false));
        let plugin = PamPlugin::new("pam", Arc::new(pam), Arc::new(MockSystemUserDb::new()));
        let settings = settings();
        let ctx = context();

        let empty = plugin.auth(&ctx, &request(None, "", &settings)).await.unwrap();
        assert_eq!(empty, AuthOutcome::Rejected(RejectReason::MalformedCredentials));
        let bad = plugin.auth(&ctx, &request(None, "wrong", &settings)).await.unwrap();
        assert_eq!(bad, AuthOutcome::Rejected(RejectReason::BadCredentials));
    }

    #[tokio::test]
    async fn test_plugin_pam_failure_is_source_unavailable() {
        let mut pam = MockPamService::new();
        pam.expect_authenticate()
            .returning(|_, _, _| Err(SourceError::Unavailable("pam stack unavailable".into())));
        let plugin = PamPlugin::new("pam", Arc::new(pam), Arc::new(MockSystemUserDb::new()));
        let settings = settings();

        let err = plugin
            .auth(&context(), &request(None, "secret", &settings))
            .await
            .unwrap_err();
        assert!(err.is_source_unavailable());
        assert!(matches!(err, PluginError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_cache_ttl_pinned_in_code() {
        let plugin = PamPlugin::new("pam", Arc::new(StaticPamService::new()), Arc::new(StaticUserDb::default()));
        assert_eq!(plugin.auth_cache_ttl(), Some(PAM_CACHE_TTL_SECS));
    }
}
