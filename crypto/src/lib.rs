//! Cryptographic building blocks for the authentication chain
//!
//! This crate provides:
//! - The credential hasher consumed by plugins (Argon2id, with bcrypt and
//!   SHA-256 hashes upgraded on a successful login)
//! - Throwaway password generation for externally managed accounts
//! - AES-256-GCM encryption of sensitive plugin settings at rest
//!
//! # Example
//!
//! ```rust
//! use crypto::{CredentialHasher, UpgradingHasher, Argon2Params, legacy};
//!
//! let hasher = UpgradingHasher::new(Argon2Params::for_testing());
//! let stored = legacy::sha256_hex("s3cret");
//!
//! let (matches, upgraded) = hasher.verify_and_maybe_upgrade("s3cret", &stored).unwrap();
//! assert!(matches);
//! assert!(upgraded.is_some());
//! ```

pub mod aes_gcm;
pub mod encryption;
pub mod error;
pub mod hasher;
pub mod kdf;
pub mod password;

pub use aes_gcm::SettingsCipher;
pub use encryption::*;
pub use error::*;
pub use hasher::*;
pub use kdf::{Argon2Params, Kdf};
pub use password::PasswordGenerator;
