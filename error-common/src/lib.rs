//! Common error handling utilities for the authentication chain
//!
//! This crate holds the pieces of error handling that every other crate in the
//! workspace agrees on: stable error codes, the user-visible login failure
//! taxonomy and sanitisation of credential material before it reaches a log line.
//!
//! # Key Features
//!
//! - **Error Codes**: Structured string codes for each failure kind
//! - **Login Failures**: Exactly three user-visible outcomes for a failed login
//! - **Sanitization**: Credential fields are masked before logging
//!
//! # Error Categories
//!
//! - **Configuration**: duplicate plugin registration, invalid channel, malformed identity
//! - **Credential source**: rejected credentials, unreachable identity sources
//! - **User creation policy**: a plugin may not create the account it authenticated
//!
//! # Example
//!
//! ```rust
//! use error_common::{LoginFailure, codes};
//!
//! let failure = LoginFailure::InvalidCredentials;
//! assert_eq!(failure.code(), codes::authentication::INVALID_CREDENTIALS);
//! assert_eq!(failure.to_string(), "invalid user name or password");
//! ```

pub mod codes;
pub mod sanitization;
pub mod types;

pub use sanitization::*;
pub use types::*;
