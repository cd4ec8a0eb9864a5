//! Logging setup with secret redaction for the authentication chain
//!
//! Every crate of the workspace logs through `tracing`. This crate installs the
//! subscriber once per process and provides a redactor for the few places where
//! free-form text that may carry credentials (settings dumps, remote responses,
//! request headers) is logged.
//!
//! # Key Features
//!
//! - **Subscriber setup**: `EnvFilter` plus a `fmt` layer, JSON or pretty
//! - **Secret redaction**: passwords, bind passwords, tokens, basic-auth headers
//! - **Hash-based correlation**: a redacted value is replaced by a short hash so
//!   repeated use of the same secret can still be correlated
//!
//! # Example
//!
//! ```rust,no_run
//! use logger_redacted::{init_tracing, LoggerConfig, LogFormat};
//!
//! let config = LoggerConfig::default().with_format(LogFormat::Json);
//! init_tracing(&config).ok();
//!
//! logger_redacted::redacted_debug!("crowd settings: app_password={}", "s3cret");
//! // logs "crowd settings: app_password=***"
//! ```

pub mod config;
pub mod macros;
pub mod redactor;

pub use config::*;
pub use redactor::*;

#[doc(hidden)]
pub use tracing;

use lazy_static::lazy_static;
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

lazy_static! {
    static ref DEFAULT_REDACTOR: SecretRedactor = SecretRedactor::default();
}

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("Tracing subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Redact `text` with the default redaction rules.
pub fn redact(text: &str) -> String {
    DEFAULT_REDACTOR.redact(text)
}

/// Install the global tracing subscriber.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.default_directive())
            .map_err(|e| LoggerError::InvalidFilter(e.to_string()))?,
    };

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_current_span(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(config.with_target)
                    .with_level(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init(),
    }
    .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))
}
