use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Prefix of environment variables that override the static configuration,
/// e.g. `AUTHCHAIN__FALLBACK_PLUGIN=rhodecode`.
pub const ENV_PREFIX: &str = "AUTHCHAIN";

/// What the orchestrator does when an identity source cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityPolicy {
    /// Abort the whole authentication attempt with an error.
    #[default]
    FailClosed,
    /// Log a warning and continue with the next plugin.
    SkipPlugin,
}

/// Static process configuration. Read once at start-up; not hot-reloadable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEngineConfig {
    /// Plugin always consulted last, whatever the dynamic settings say.
    pub fallback_plugin: Option<String>,
    /// Upper bound for one plugin's authentication call.
    pub plugin_timeout_ms: Option<u64>,
    pub connectivity_policy: ConnectivityPolicy,
    /// Base64 AES-256 key for encrypted settings.
    pub settings_encryption_key: Option<String>,
    pub logging: LoggerConfig,
}

impl AuthEngineConfig {
    /// Load from an optional file plus `AUTHCHAIN__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder.add_source(Self::environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub fn plugin_timeout(&self) -> Option<Duration> {
        self.plugin_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn with_fallback_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.fallback_plugin = Some(plugin_id.into());
        self
    }

    pub fn with_plugin_timeout(mut self, timeout: Duration) -> Self {
        self.plugin_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_connectivity_policy(mut self, policy: ConnectivityPolicy) -> Self {
        self.connectivity_policy = policy;
        self
    }
}
