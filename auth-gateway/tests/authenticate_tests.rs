use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auth_gateway::{AuthError, Authenticator};
use auth_identity::{permissions, InMemoryUserRepository, LocalUser, UserRepository};
use auth_plugins::{
    HeadersPlugin, LdapAttributes, LdapConfig, LdapConnector, LdapPlugin, PamPlugin, PamService, RhodeCodePlugin,
    SourceError, StaticUserDb,
};
use config_engine::{ConnectivityPolicy, InMemorySettingsStore, SettingsStore};
use crypto::{Argon2Params, CredentialHasher, UpgradingHasher};
use mockall::mock;
use plugin_runtime_core::{
    AuthOutcome, AuthPlugin, AuthRequest, ContractError, Environ, ExternalPolicy, PluginContext, PluginError,
    PluginId, RawIdentity, RejectReason,
};
use plugins_registry_api::{RegistryBuilder, RegistryHandle};

mock! {
    Directory {}

    #[async_trait]
    impl LdapConnector for Directory {
        async fn search(&self, config: &LdapConfig, filter: &str) -> Result<Vec<String>, SourceError>;
        async fn bind_and_fetch(
            &self,
            config: &LdapConfig,
            dn: &str,
            password: &str,
        ) -> Result<Option<LdapAttributes>, SourceError>;
    }
}

mock! {
    Pam {}

    #[async_trait]
    impl PamService for Pam {
        async fn authenticate(&self, service: &str, username: &str, password: &str) -> Result<bool, SourceError>;
    }
}

#[derive(Clone, Copy)]
enum Behaviour {
    Reject,
    Accept,
    Unavailable,
    Hang,
    Malformed,
    InactiveAtSource,
}

/// Plugin with a fixed answer that records every `auth()` call.
struct Scripted {
    id: PluginId,
    name: &'static str,
    behaviour: Behaviour,
    container: bool,
    external: bool,
    calls: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Scripted {
    fn new(name: &'static str, behaviour: Behaviour) -> Self {
        Self {
            id: PluginId::new(name),
            name,
            behaviour,
            container: false,
            external: false,
            calls: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn external(mut self) -> Self {
        self.external = true;
        self
    }

    fn logging_to(mut self, log: &Arc<Mutex<Vec<&'static str>>>) -> Self {
        self.log = Arc::clone(log);
        self
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn identity(&self, username: &str) -> RawIdentity {
        RawIdentity::new()
            .username(username)
            .firstname("Test")
            .lastname("User")
            .email(format!("{username}@example.com"))
            .groups(Vec::<String>::new())
            .extern_name(username)
            .extern_type(self.name)
            .admin(false)
            .active(true)
            .active_from_extern(None)
    }
}

#[async_trait]
impl AuthPlugin for Scripted {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        self.name
    }

    fn is_container_auth(&self) -> bool {
        self.container
    }

    fn external_policy(&self) -> Option<ExternalPolicy> {
        self.external.then(ExternalPolicy::default)
    }

    async fn user_activation_state(&self, _ctx: &PluginContext) -> plugin_runtime_core::Result<bool> {
        Ok(true)
    }

    async fn auth(&self, _ctx: &PluginContext, request: &AuthRequest<'_>) -> plugin_runtime_core::Result<AuthOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.name);
        match self.behaviour {
            Behaviour::Reject => Ok(AuthOutcome::Rejected(RejectReason::BadCredentials)),
            Behaviour::Accept => Ok(AuthOutcome::Authenticated(self.identity(request.username))),
            Behaviour::Unavailable => Err(PluginError::source_unavailable(self.name, "connection refused")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(AuthOutcome::Rejected(RejectReason::BadCredentials))
            }
            Behaviour::Malformed => {
                let mut raw = self.identity(request.username);
                raw.email = None;
                Ok(AuthOutcome::Authenticated(raw))
            }
            Behaviour::InactiveAtSource => Ok(AuthOutcome::Authenticated(
                self.identity(request.username).active_from_extern(Some(false)),
            )),
        }
    }
}

fn hasher() -> UpgradingHasher {
    UpgradingHasher::new(Argon2Params::for_testing())
}

fn context(users: Arc<InMemoryUserRepository>) -> PluginContext {
    PluginContext::new(Arc::new(InMemorySettingsStore::ephemeral().unwrap()), users, Arc::new(hasher()))
}

/// Register `plugins`, mark each active and list them as enabled in order.
async fn chain(ctx: &PluginContext, plugins: Vec<Arc<dyn AuthPlugin>>, fallback: Option<&str>) -> RegistryHandle {
    let mut ids = Vec::new();
    let mut builder = RegistryBuilder::new().fallback(fallback.map(PluginId::new));
    for plugin in plugins {
        plugin.create_or_update_setting(ctx, "enabled", true.into()).await.unwrap();
        if Some(plugin.id().as_str()) != fallback {
            ids.push(plugin.id().to_string());
        }
        builder = builder.shared_plugin(plugin);
    }
    ctx.settings.set_enabled_plugin_ids(ids).await.unwrap();
    RegistryHandle::new(builder.build().unwrap())
}

fn alice(password: &str) -> LocalUser {
    LocalUser::new(0, "alice")
        .with_extern_type("rhodecode")
        .with_password_hash(hasher().create_hash(password).unwrap())
}

fn silent_directory() -> Arc<MockDirectory> {
    let mut directory = MockDirectory::new();
    directory.expect_search().never();
    directory.expect_bind_and_fetch().never();
    Arc::new(directory)
}

#[tokio::test]
async fn test_internal_plugin_wins_before_ldap() {
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert_user(alice("correct-pw"));
    let ctx = context(Arc::clone(&users));
    let handle = chain(
        &ctx,
        vec![
            Arc::new(RhodeCodePlugin::new("rhodecode")),
            Arc::new(LdapPlugin::new("ldap", silent_directory())),
        ],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx);

    let identity = authenticator
        .authenticate("alice", "correct-pw", None, "http", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.username, "alice");
    assert_eq!(identity.extern_type, "rhodecode");
}

#[tokio::test]
async fn test_user_bound_elsewhere_never_reaches_ldap() {
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert_user(alice("correct-pw"));
    let ctx = context(Arc::clone(&users));
    let handle = chain(
        &ctx,
        vec![
            Arc::new(RhodeCodePlugin::new("rhodecode")),
            Arc::new(LdapPlugin::new("ldap", silent_directory())),
        ],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx);

    let outcome = authenticator
        .authenticate("alice", "wrong-pw", None, "http", false)
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_pam_results_cached_for_four_seconds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = MockPam::new();
    let counter = Arc::clone(&calls);
    service.expect_authenticate().returning(move |_, _, password| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(password == "pw")
    });

    let users = Arc::new(InMemoryUserRepository::new().with_default_permissions([permissions::EXTERN_ACTIVATE_AUTO]));
    let ctx = context(Arc::clone(&users));
    let pam = PamPlugin::new("pam", Arc::new(service), Arc::new(StaticUserDb::default()));
    let handle = chain(&ctx, vec![Arc::new(pam)], None).await;
    let authenticator = Authenticator::new(handle, ctx);

    let first = authenticator.authenticate("alice", "pw", None, "http", false).await.unwrap();
    assert!(first.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let second = authenticator.authenticate("alice", "pw", None, "http", false).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    authenticator.authenticate("alice", "pw", None, "http", false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cached_success_not_replayed_for_other_password() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut service = MockPam::new();
    let counter = Arc::clone(&calls);
    service.expect_authenticate().returning(move |_, _, password| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(password == "pw")
    });

    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(Arc::clone(&users));
    let pam = PamPlugin::new("pam", Arc::new(service), Arc::new(StaticUserDb::default()));
    let handle = chain(&ctx, vec![Arc::new(pam)], None).await;
    let authenticator = Authenticator::new(handle, ctx);

    assert!(authenticator.authenticate("alice", "pw", None, "http", false).await.unwrap().is_some());
    assert!(authenticator.authenticate("alice", "guess", None, "http", false).await.unwrap().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The cached rejection does not block the right password either
    assert!(authenticator.authenticate("alice", "pw", None, "http", false).await.unwrap().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_inactive_at_source_creates_nothing() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(Arc::clone(&users));
    let source = Scripted::new("remote", Behaviour::InactiveAtSource).external();
    let calls = source.counter();
    let handle = chain(&ctx, vec![Arc::new(source)], None).await;
    let authenticator = Authenticator::new(handle, ctx);

    let outcome = authenticator
        .authenticate("erin", "pw", None, "http", false)
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(users.get_by_username("erin", true).await.unwrap().is_none());
}

#[tokio::test]
async fn test_container_only_attempt_reaches_headers_plugin() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(Arc::clone(&users));
    let password_plugin = Scripted::new("password", Behaviour::Accept);
    let calls = password_plugin.counter();
    let handle = chain(
        &ctx,
        vec![Arc::new(password_plugin), Arc::new(HeadersPlugin::new("headers"))],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx);
    let environ: Environ = [("REMOTE_USER".to_string(), "bob".to_string())].into_iter().collect();

    let identity = authenticator
        .authenticate("", "", Some(&environ), "http", true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(identity.username, "bob");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let bob = users.get_by_username("bob", false).await.unwrap().unwrap();
    assert_eq!(bob.extern_type.as_deref(), Some("headers"));
}

#[tokio::test]
async fn test_bogus_channel_fails_before_any_plugin() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let plugin = Scripted::new("password", Behaviour::Accept);
    let calls = plugin.counter();
    let handle = chain(&ctx, vec![Arc::new(plugin)], None).await;
    let authenticator = Authenticator::new(handle, ctx);

    let err = authenticator
        .authenticate("alice", "pw", None, "bogus", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Contract(ContractError::InvalidChannel(ref c)) if c == "bogus"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_attempt_order_follows_enabled_list_with_fallback_last() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let log = Arc::new(Mutex::new(Vec::new()));
    let handle = chain(
        &ctx,
        vec![
            Arc::new(Scripted::new("fallback", Behaviour::Reject).logging_to(&log)),
            Arc::new(Scripted::new("crowd", Behaviour::Reject).logging_to(&log)),
            Arc::new(Scripted::new("ldap", Behaviour::Reject).logging_to(&log)),
        ],
        Some("fallback"),
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx);

    let outcome = authenticator
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(*log.lock().unwrap(), vec!["crowd", "ldap", "fallback"]);
}

#[tokio::test]
async fn test_first_success_stops_the_chain() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let log = Arc::new(Mutex::new(Vec::new()));
    let handle = chain(
        &ctx,
        vec![
            Arc::new(Scripted::new("first", Behaviour::Reject).logging_to(&log)),
            Arc::new(Scripted::new("second", Behaviour::Accept).logging_to(&log)),
            Arc::new(Scripted::new("third", Behaviour::Accept).logging_to(&log)),
        ],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx);

    let identity = authenticator
        .authenticate("alice", "pw", None, "vcs", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.extern_type, "second");
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_unavailable_source_fails_closed_by_default() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let next = Scripted::new("next", Behaviour::Accept);
    let calls = next.counter();
    let handle = chain(
        &ctx,
        vec![Arc::new(Scripted::new("ldap", Behaviour::Unavailable)), Arc::new(next)],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx);

    let err = authenticator
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SourceUnavailable { ref plugin, .. } if plugin == "ldap"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unavailable_source_skipped_when_configured() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let handle = chain(
        &ctx,
        vec![
            Arc::new(Scripted::new("ldap", Behaviour::Unavailable)),
            Arc::new(Scripted::new("next", Behaviour::Accept)),
        ],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx).with_connectivity_policy(ConnectivityPolicy::SkipPlugin);

    let identity = authenticator
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.extern_type, "next");
}

#[tokio::test(start_paused = true)]
async fn test_slow_plugin_times_out() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let handle = chain(
        &ctx,
        vec![
            Arc::new(Scripted::new("slow", Behaviour::Hang)),
            Arc::new(Scripted::new("next", Behaviour::Accept)),
        ],
        None,
    )
    .await;

    let fail_closed = Authenticator::new(handle.clone(), ctx.clone()).with_plugin_timeout(Duration::from_millis(100));
    let err = fail_closed
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap_err();
    assert!(err.is_source_unavailable());

    let skipping = Authenticator::new(handle, ctx)
        .with_plugin_timeout(Duration::from_millis(100))
        .with_connectivity_policy(ConnectivityPolicy::SkipPlugin);
    let identity = skipping
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.extern_type, "next");
}

#[tokio::test]
async fn test_malformed_identity_aborts_even_when_skipping() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let handle = chain(
        &ctx,
        vec![
            Arc::new(Scripted::new("broken", Behaviour::Malformed)),
            Arc::new(Scripted::new("next", Behaviour::Accept)),
        ],
        None,
    )
    .await;
    let authenticator = Authenticator::new(handle, ctx).with_connectivity_policy(ConnectivityPolicy::SkipPlugin);

    let err = authenticator
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Contract(ContractError::MalformedIdentity { ref missing, .. }) if missing == &vec!["email"]
    ));
}

#[tokio::test]
async fn test_unregistered_enabled_plugin() {
    let users = Arc::new(InMemoryUserRepository::new());
    let ctx = context(users);
    let handle = chain(&ctx, vec![Arc::new(Scripted::new("next", Behaviour::Accept))], None).await;
    ctx.settings
        .set_enabled_plugin_ids(vec!["ghost".into(), "next".into()])
        .await
        .unwrap();
    let authenticator = Authenticator::new(handle, ctx);

    let err = authenticator
        .authenticate("alice", "pw", None, "http", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnregisteredPlugin(ref id) if id == "ghost"));

    let identity = authenticator
        .authenticate("alice", "pw", None, "http", true)
        .await
        .unwrap();
    assert!(identity.is_some());
}
