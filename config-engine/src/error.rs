use error_common::{codes, ErrorClass, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration source could not be read: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Setting `{key}` failed validation: {reason}")]
    ValidationError { key: String, reason: String },

    #[error("Unknown setting type `{0}`")]
    UnknownSettingType(String),

    #[error("Setting `{key}` encryption failed: {source}")]
    EncryptionError {
        key: String,
        #[source]
        source: crypto::CryptoError,
    },

    #[error("Setting `{key}` could not be decoded: {reason}")]
    DecodeError { key: String, reason: String },

    #[error("Settings store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ErrorClass for ConfigError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreUnavailable(_) => ErrorKind::Storage,
            _ => ErrorKind::Configuration,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => codes::storage::SETTINGS_STORE,
            _ => codes::configuration::INVALID_SETTING,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
