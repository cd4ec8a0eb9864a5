use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes;

/// The only outcomes a login surface may show for a failed attempt.
///
/// Which plugin rejected the credentials is never part of the message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginFailure {
    #[error("invalid user name or password")]
    InvalidCredentials,

    #[error("your account is disabled")]
    AccountDisabled,

    #[error("your account must be created by an administrator first")]
    CreationNotAllowed,
}

impl LoginFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => codes::authentication::INVALID_CREDENTIALS,
            Self::AccountDisabled => codes::authentication::ACCOUNT_DISABLED,
            Self::CreationNotAllowed => codes::authentication::USER_CREATION_NOT_ALLOWED,
        }
    }
}

/// Classification used by callers that need to decide between retrying,
/// surfacing a login failure and reporting a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal wiring or programming mistake, never retried.
    Configuration,
    /// An identity source could not be reached.
    SourceUnavailable,
    /// User-visible policy outcome.
    UserPolicy,
    /// A collaborator store failed.
    Storage,
}

/// Implemented by the error enums of the workspace so the outer layers can
/// classify an error without matching on every crate's variants.
pub trait ErrorClass {
    fn kind(&self) -> ErrorKind;
    fn code(&self) -> &'static str;
}
