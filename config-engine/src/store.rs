use std::sync::Arc;

use async_trait::async_trait;
use crypto::{SecretCipher, SettingsCipher};
use dashmap::DashMap;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::settings::{SettingKind, SettingType, SettingValue, ENABLED_PLUGINS_KEY};

/// Persistent key/value settings consumed by the authentication chain.
///
/// Reads must be safe to run concurrently with writes; every authentication
/// attempt reads the settings it needs afresh.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Ordered ids of enabled plugins. The order is the authentication order.
    async fn get_enabled_plugin_ids(&self) -> Result<Vec<String>>;

    async fn set_enabled_plugin_ids(&self, ids: Vec<String>) -> Result<()>;

    /// Read one setting by its full key, decrypted if it was stored encrypted.
    async fn get_setting(&self, key: &str) -> Result<Option<SettingValue>>;

    /// Write one setting, returning the stored (decrypted) value.
    async fn create_or_update_setting(
        &self,
        key: &str,
        value: SettingValue,
        type_hint: SettingType,
    ) -> Result<SettingValue>;
}

#[derive(Debug, Clone)]
struct StoredSetting {
    value: SettingValue,
    ty: SettingType,
}

/// In-memory settings store for tests, the CLI and single-process deployments.
pub struct InMemorySettingsStore {
    settings: Arc<DashMap<String, StoredSetting>>,
    cipher: Arc<dyn SecretCipher>,
}

impl InMemorySettingsStore {
    pub fn new(cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            settings: Arc::new(DashMap::new()),
            cipher,
        }
    }

    /// Store whose encrypted values use a random per-process key.
    pub fn ephemeral() -> Result<Self> {
        let cipher = SettingsCipher::ephemeral().map_err(|source| ConfigError::EncryptionError {
            key: "<ephemeral>".to_string(),
            source,
        })?;
        Ok(Self::new(Arc::new(cipher)))
    }

    /// The value as held at rest, before decryption.
    pub fn stored_raw(&self, key: &str) -> Option<(SettingValue, SettingType)> {
        self.settings
            .get(key)
            .map(|entry| (entry.value.clone(), entry.ty))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.settings.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn seal(&self, key: &str, value: &SettingValue) -> Result<SettingValue> {
        let encoded = serde_json::to_string(value).map_err(|e| ConfigError::DecodeError {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let sealed = self
            .cipher
            .encrypt_str(&encoded)
            .map_err(|source| ConfigError::EncryptionError {
                key: key.to_string(),
                source,
            })?;
        Ok(SettingValue::Str(sealed))
    }

    fn open(&self, key: &str, stored: &StoredSetting) -> Result<SettingValue> {
        if !stored.ty.encrypted {
            return Ok(stored.value.clone());
        }
        let sealed = stored.value.as_str().ok_or_else(|| ConfigError::DecodeError {
            key: key.to_string(),
            reason: "encrypted setting is not a string".to_string(),
        })?;
        let encoded = self
            .cipher
            .decrypt_str(sealed)
            .map_err(|source| ConfigError::EncryptionError {
                key: key.to_string(),
                source,
            })?;
        serde_json::from_str(&encoded).map_err(|e| ConfigError::DecodeError {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get_enabled_plugin_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .get_setting(ENABLED_PLUGINS_KEY)
            .await?
            .and_then(|value| value.as_list())
            .unwrap_or_default())
    }

    async fn set_enabled_plugin_ids(&self, ids: Vec<String>) -> Result<()> {
        self.create_or_update_setting(
            ENABLED_PLUGINS_KEY,
            SettingValue::List(ids),
            SettingType::plain(SettingKind::List),
        )
        .await
        .map(|_| ())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<SettingValue>> {
        let stored = match self.settings.get(key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        self.open(key, &stored).map(Some)
    }

    async fn create_or_update_setting(
        &self,
        key: &str,
        value: SettingValue,
        type_hint: SettingType,
    ) -> Result<SettingValue> {
        debug!(key, ty = %type_hint, "storing setting");
        let at_rest = if type_hint.encrypted {
            self.seal(key, &value)?
        } else {
            value.clone()
        };
        self.settings.insert(
            key.to_string(),
            StoredSetting {
                value: at_rest,
                ty: type_hint,
            },
        );
        Ok(value)
    }
}
