//! Plugin error types
//!
//! Expected "credentials did not match" is never an error: plugins report it
//! as [`AuthOutcome::Rejected`](crate::AuthOutcome). The variants below are
//! the faults that the orchestrator must see.

use auth_identity::IdentityError;
use config_engine::ConfigError;
use crypto::CryptoError;
use error_common::{codes, ErrorClass, ErrorKind};
use thiserror::Error;

/// Violations of the plugin contract by a caller or by a plugin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Channel argument other than `http` or `vcs`
    #[error("auth channel must be one of http, vcs; got `{0}` instead")]
    InvalidChannel(String),

    /// A plugin returned an identity without every required attribute
    #[error("plugin `{plugin}` returned an identity missing attributes: {}", missing.join(", "))]
    MalformedIdentity {
        plugin: String,
        missing: Vec<&'static str>,
    },

    /// A setting write that does not match the plugin's schema
    #[error("plugin `{plugin}` has no setting `{setting}`")]
    UnknownSetting { plugin: String, setting: String },

    /// A setting value rejected by its schema validator
    #[error("setting `{setting}` is invalid: {reason}")]
    InvalidSetting { setting: String, reason: String },
}

/// Main plugin error type
#[derive(Error, Debug)]
pub enum PluginError {
    /// The identity source could not be reached or answered abnormally
    #[error("identity source for plugin `{plugin}` unavailable: {reason}")]
    SourceUnavailable { plugin: String, reason: String },

    #[error(transparent)]
    Contract(#[from] ContractError),

    /// User store failure; includes the "not allowed to create user" policy error
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Settings(#[from] ConfigError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Background task running a blocking call was lost
    #[error("plugin task failed: {0}")]
    Task(String),
}

impl PluginError {
    pub fn source_unavailable(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

impl ErrorClass for ContractError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidChannel(_) => codes::configuration::INVALID_CHANNEL,
            Self::MalformedIdentity { .. } => codes::configuration::MALFORMED_IDENTITY,
            Self::UnknownSetting { .. } | Self::InvalidSetting { .. } => codes::configuration::INVALID_SETTING,
        }
    }
}

impl ErrorClass for PluginError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::Contract(e) => e.kind(),
            Self::Identity(e) => e.kind(),
            Self::Settings(e) => e.kind(),
            Self::Crypto(_) | Self::Task(_) => ErrorKind::Configuration,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => codes::source::SOURCE_UNAVAILABLE,
            Self::Contract(e) => e.code(),
            Self::Identity(e) => e.code(),
            Self::Settings(e) => e.code(),
            Self::Crypto(_) | Self::Task(_) => codes::configuration::INVALID_SETTING,
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
