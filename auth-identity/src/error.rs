use error_common::{codes, ErrorClass, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Not allowed to create user `{username}`")]
    NotAllowedToCreateUser { username: String },

    #[error("The default user cannot be modified")]
    DefaultUserImmutable,

    #[error("User store error: {0}")]
    Storage(String),
}

impl ErrorClass for IdentityError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAllowedToCreateUser { .. } => ErrorKind::UserPolicy,
            _ => ErrorKind::Storage,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotAllowedToCreateUser { .. } => codes::authentication::USER_CREATION_NOT_ALLOWED,
            _ => codes::storage::USER_STORE,
        }
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
