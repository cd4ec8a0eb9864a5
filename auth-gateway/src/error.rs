use auth_identity::IdentityError;
use error_common::{codes, ErrorClass, ErrorKind, LoginFailure};
use plugin_runtime_core::{ContractError, PluginError};
use plugins_registry_api::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad caller input such as an unknown channel
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Listed in the enabled plugins but not registered in this process
    #[error("enabled plugin \"{0}\" is not registered")]
    UnregisteredPlugin(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An identity source could not be reached or did not answer in time
    #[error("identity source of plugin {plugin} unavailable: {reason}")]
    SourceUnavailable { plugin: String, reason: String },

    /// The authenticating plugin may not create the missing local user
    #[error("user {username} must be created by an administrator first")]
    UserCreationNotAllowed { username: String },

    #[error(transparent)]
    Plugin(PluginError),
}

impl AuthError {
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

impl From<PluginError> for AuthError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::SourceUnavailable { plugin, reason } => Self::SourceUnavailable { plugin, reason },
            PluginError::Identity(IdentityError::NotAllowedToCreateUser { username }) => {
                Self::UserCreationNotAllowed { username }
            }
            PluginError::Contract(e) => Self::Contract(e),
            other => Self::Plugin(other),
        }
    }
}

impl ErrorClass for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Contract(e) => e.kind(),
            Self::UnregisteredPlugin(_) => ErrorKind::Configuration,
            Self::Registry(e) => e.kind(),
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::UserCreationNotAllowed { .. } => ErrorKind::UserPolicy,
            Self::Plugin(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Contract(e) => e.code(),
            Self::UnregisteredPlugin(_) => codes::configuration::INVALID_SETTING,
            Self::Registry(e) => e.code(),
            Self::SourceUnavailable { .. } => codes::source::SOURCE_UNAVAILABLE,
            Self::UserCreationNotAllowed { .. } => codes::authentication::USER_CREATION_NOT_ALLOWED,
            Self::Plugin(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// A failed interactive login: either one of the user-visible outcomes or
/// an internal error that must not be dressed up as one.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error(transparent)]
    Failure(#[from] LoginFailure),

    #[error(transparent)]
    Internal(AuthError),
}

impl From<AuthError> for LoginError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserCreationNotAllowed { .. } => Self::Failure(LoginFailure::CreationNotAllowed),
            other => Self::Internal(other),
        }
    }
}
