use std::collections::HashSet;
use std::sync::Arc;

use auth_identity::UserRepository;
use config_engine::SettingsStore;
use crypto::CredentialHasher;

use crate::error::{PluginError, Result};

/// Collaborators a plugin needs during an authentication attempt.
#[derive(Clone)]
pub struct PluginContext {
    pub settings: Arc<dyn SettingsStore>,
    pub users: Arc<dyn UserRepository>,
    pub hasher: Arc<dyn CredentialHasher>,
}

impl PluginContext {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            settings,
            users,
            hasher,
        }
    }

    /// Verify `password` against `stored_hash` off the async executor.
    pub async fn verify_password(&self, password: &str, stored_hash: &str) -> Result<(bool, Option<String>)> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();
        let verdict = tokio::task::spawn_blocking(move || hasher.verify_and_maybe_upgrade(&password, &stored_hash))
            .await
            .map_err(|e| PluginError::Task(e.to_string()))??;
        Ok(verdict)
    }

    pub async fn check_password(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let (matches, _) = self.verify_password(password, stored_hash).await?;
        Ok(matches)
    }

    pub async fn hash_password(&self, password: &str) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.create_hash(&password))
            .await
            .map_err(|e| PluginError::Task(e.to_string()))??;
        Ok(hash)
    }

    pub async fn default_permissions(&self) -> Result<HashSet<String>> {
        Ok(self.users.default_user_permissions().await?)
    }

    /// Whether the anonymous account holds global permission `permission`.
    pub async fn has_default_permission(&self, permission: &str) -> Result<bool> {
        Ok(self.default_permissions().await?.contains(permission))
    }
}
