use std::sync::Arc;

use error_common::LoginFailure;
use plugin_runtime_core::{lookup_user, Channel, Environ, IdentityAttributes};
use tracing::{info, warn};

use crate::authenticator::Authenticator;
use crate::error::{AuthError, LoginError, Result};

/// Entry points used by the interactive login form and the VCS request path.
#[derive(Debug, Clone)]
pub struct LoginService {
    authenticator: Arc<Authenticator>,
}

impl LoginService {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Interactive login over HTTP.
    ///
    /// A failed attempt is reported as exactly one [`LoginFailure`] and never
    /// says which plugin rejected the credentials.
    ///
    /// # Errors
    ///
    /// [`LoginError::Failure`] for the user-visible outcomes,
    /// [`LoginError::Internal`] for configuration and source errors.
    pub async fn login(&self, username: &str, password: &str) -> std::result::Result<IdentityAttributes, LoginError> {
        let outcome = self
            .authenticator
            .authenticate_on(username, password, None, Channel::Http, false)
            .await;

        match outcome {
            Ok(Some(identity)) => {
                info!(user = %identity.username, "Login succeeded");
                Ok(identity)
            }
            Ok(None) => Err(self.classify_failure(username).await?.into()),
            Err(err) => {
                warn!(user = %username, error = %err, "Login failed");
                Err(err.into())
            }
        }
    }

    /// Login from a request environment set by a fronting proxy.
    pub async fn login_container(&self, environ: &Environ) -> std::result::Result<IdentityAttributes, LoginError> {
        self.authenticator
            .authenticate_on("", "", Some(environ), Channel::Http, true)
            .await?
            .ok_or(LoginError::Failure(LoginFailure::InvalidCredentials))
    }

    /// Credential check for VCS push and pull.
    ///
    /// # Errors
    ///
    /// Same as [`Authenticator::authenticate_on`].
    pub async fn authenticate_vcs(
        &self,
        username: &str,
        password: &str,
        environ: Option<&Environ>,
    ) -> Result<Option<IdentityAttributes>> {
        self.authenticator
            .authenticate_on(username, password, environ, Channel::Vcs, false)
            .await
    }

    async fn classify_failure(&self, username: &str) -> std::result::Result<LoginFailure, AuthError> {
        let user = lookup_user(self.authenticator.context(), username).await?;
        match user {
            Some(user) if !user.active => {
                warn!(user = %user.username, "Login attempt for disabled account");
                Ok(LoginFailure::AccountDisabled)
            }
            _ => {
                warn!(user = %username, "Invalid username or password");
                Ok(LoginFailure::InvalidCredentials)
            }
        }
    }
}
