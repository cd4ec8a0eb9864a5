//! Errors shared by the identity-source clients.

use plugin_runtime_core::PluginError;
use thiserror::Error;

/// User agent sent to HTTP identity sources.
pub const USER_AGENT: &str = concat!("AuthChain-auth-", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum SourceError {
    /// Server down, connection refused, timed out
    #[error("identity source unreachable: {0}")]
    Unavailable(String),

    /// The source answered, but not in a way we understand
    #[error("identity source protocol error: {0}")]
    Protocol(String),
}

impl SourceError {
    pub fn into_plugin_error(self, plugin: &str) -> PluginError {
        PluginError::source_unavailable(plugin, self.to_string())
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}
