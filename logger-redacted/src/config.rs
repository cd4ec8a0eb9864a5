// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub redaction_enabled: bool,
    pub log_level: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl LoggerConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Default directive for the chain's own crates; `RUST_LOG` wins over it.
    pub fn default_directive(&self) -> String {
        format!(
            "auth_gateway={level},plugin_runtime_core={level},auth_plugins={level},\
             plugins_registry_api={level},config_engine={level},auth_identity={level},\
             ops_cli={level},reqwest=info",
            level = self.log_level
        )
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}
