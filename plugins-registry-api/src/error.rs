use config_engine::ConfigError;
use error_common::{codes, ErrorClass, ErrorKind};
use plugin_runtime_core::PluginError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// Two plugins registered under one identifier
    #[error("cannot register authentication plugin twice: \"{0}\"")]
    DuplicatePlugin(String),

    /// The configured fallback plugin was never registered
    #[error("fallback plugin \"{0}\" is not registered")]
    UnknownFallback(String),

    /// The enabled plugin list could not be read
    #[error(transparent)]
    Settings(#[from] ConfigError),

    /// Reading plugin state from the settings store failed
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl ErrorClass for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicatePlugin(_) | Self::UnknownFallback(_) => ErrorKind::Configuration,
            Self::Settings(e) => e.kind(),
            Self::Plugin(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::DuplicatePlugin(_) => codes::configuration::DUPLICATE_PLUGIN,
            Self::UnknownFallback(_) => codes::configuration::INVALID_SETTING,
            Self::Settings(e) => e.code(),
            Self::Plugin(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
