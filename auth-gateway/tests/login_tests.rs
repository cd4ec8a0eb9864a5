use std::sync::Arc;

use async_trait::async_trait;
use auth_gateway::{Authenticator, LoginError, LoginService};
use auth_identity::{AuthToken, InMemoryUserRepository, LocalUser, TokenRole};
use auth_plugins::{AuthTokenPlugin, HeadersPlugin, RhodeCodePlugin};
use config_engine::{InMemorySettingsStore, SettingsStore};
use crypto::{Argon2Params, CredentialHasher, UpgradingHasher};
use error_common::LoginFailure;
use plugin_runtime_core::{
    AuthOutcome, AuthPlugin, AuthRequest, Environ, ExternalPolicy, PluginContext, PluginId, RawIdentity,
};
use plugins_registry_api::{RegistryBuilder, RegistryHandle};

/// External source that vouches for anyone but may not create users.
struct InviteOnly {
    id: PluginId,
}

#[async_trait]
impl AuthPlugin for InviteOnly {
    fn id(&self) -> &PluginId {
        &self.id
    }

    fn name(&self) -> &'static str {
        "invite-only"
    }

    fn display_name(&self) -> &'static str {
        "Invite only"
    }

    fn external_policy(&self) -> Option<ExternalPolicy> {
        Some(ExternalPolicy::new(false, true))
    }

    async fn user_activation_state(&self, _ctx: &PluginContext) -> plugin_runtime_core::Result<bool> {
        Ok(true)
    }

    async fn auth(&self, _ctx: &PluginContext, request: &AuthRequest<'_>) -> plugin_runtime_core::Result<AuthOutcome> {
        Ok(AuthOutcome::Authenticated(
            RawIdentity::new()
                .username(request.username)
                .firstname("Dave")
                .lastname("Doe")
                .email("dave@example.com")
                .groups(Vec::<String>::new())
                .extern_name(request.username)
                .extern_type("invite-only")
                .admin(false)
                .active(true)
                .active_from_extern(None),
        ))
    }
}

fn hasher() -> UpgradingHasher {
    UpgradingHasher::new(Argon2Params::for_testing())
}

async fn service(users: Arc<InMemoryUserRepository>, plugins: Vec<Arc<dyn AuthPlugin>>) -> LoginService {
    let ctx = PluginContext::new(Arc::new(InMemorySettingsStore::ephemeral().unwrap()), users, Arc::new(hasher()));
    let mut ids = Vec::new();
    let mut builder = RegistryBuilder::new();
    for plugin in plugins {
        plugin.create_or_update_setting(&ctx, "enabled", true.into()).await.unwrap();
        ids.push(plugin.id().to_string());
        builder = builder.shared_plugin(plugin);
    }
    ctx.settings.set_enabled_plugin_ids(ids).await.unwrap();
    let handle = RegistryHandle::new(builder.build().unwrap());
    LoginService::new(Arc::new(Authenticator::new(handle, ctx)))
}

fn local_user(username: &str, password: &str) -> LocalUser {
    LocalUser::new(0, username)
        .with_extern_type("rhodecode")
        .with_password_hash(hasher().create_hash(password).unwrap())
}

fn failure(err: LoginError) -> LoginFailure {
    match err {
        LoginError::Failure(failure) => failure,
        LoginError::Internal(err) => panic!("unexpected internal error: {err}"),
    }
}

#[tokio::test]
async fn test_login_success() {
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert_user(local_user("alice", "secret"));
    let login = service(users, vec![Arc::new(RhodeCodePlugin::new("rhodecode"))]).await;

    let identity = login.login("alice", "secret").await.unwrap();
    assert_eq!(identity.username, "alice");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert_user(local_user("alice", "secret"));
    let login = service(users, vec![Arc::new(RhodeCodePlugin::new("rhodecode"))]).await;

    let wrong = failure(login.login("alice", "nope").await.unwrap_err());
    let unknown = failure(login.login("mallory", "secret").await.unwrap_err());
    assert_eq!(wrong, LoginFailure::InvalidCredentials);
    assert_eq!(unknown, LoginFailure::InvalidCredentials);
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn test_disabled_account_is_reported() {
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert_user(local_user("carol", "secret").with_active(false));
    let login = service(users, vec![Arc::new(RhodeCodePlugin::new("rhodecode"))]).await;

    let err = failure(login.login("carol", "secret").await.unwrap_err());
    assert_eq!(err, LoginFailure::AccountDisabled);
}

#[tokio::test]
async fn test_creation_policy_is_reported() {
    let users = Arc::new(InMemoryUserRepository::new());
    let login = service(
        Arc::clone(&users),
        vec![Arc::new(InviteOnly {
            id: PluginId::new("invite-only"),
        })],
    )
    .await;

    let err = failure(login.login("dave", "whatever").await.unwrap_err());
    assert_eq!(err, LoginFailure::CreationNotAllowed);
    assert_eq!(users.user_count(), 1);
}

#[tokio::test]
async fn test_container_login() {
    let users = Arc::new(InMemoryUserRepository::new());
    let login = service(
        users,
        vec![Arc::new(RhodeCodePlugin::new("rhodecode")), Arc::new(HeadersPlugin::new("headers"))],
    )
    .await;

    let environ: Environ = [("HTTP_X_FORWARDED_USER".to_string(), "CORP\\bob".to_string())]
        .into_iter()
        .collect();
    let identity = login.login_container(&environ).await.unwrap();
    assert_eq!(identity.username, "bob");

    let empty = Environ::new();
    let err = failure(login.login_container(&empty).await.unwrap_err());
    assert_eq!(err, LoginFailure::InvalidCredentials);
}

#[tokio::test]
async fn test_vcs_accepts_token_where_http_does_not() {
    let users = Arc::new(InMemoryUserRepository::new());
    users.insert_user(local_user("alice", "secret"));
    users.add_auth_token("alice", AuthToken::new("tok-vcs", TokenRole::Vcs));
    let login = service(
        users,
        vec![
            Arc::new(RhodeCodePlugin::new("rhodecode")),
            Arc::new(AuthTokenPlugin::new("authtoken")),
        ],
    )
    .await;

    let identity = login.authenticate_vcs("alice", "tok-vcs", None).await.unwrap().unwrap();
    assert_eq!(identity.username, "alice");

    let err = failure(login.login("alice", "tok-vcs").await.unwrap_err());
    assert_eq!(err, LoginFailure::InvalidCredentials);
}
