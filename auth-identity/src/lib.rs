//! Local user directory for the authentication chain
//!
//! This module provides the user store that plugins read from and that
//! external identities are synchronised into:
//! - Local user records with case-insensitive lookup
//! - Plugin-owned user groups with scoped membership synchronisation
//! - Per-user auth tokens with role and expiry
//! - Transactional create-or-update of users coming from external sources
//!
//! # Example
//!
//! ```rust
//! use auth_identity::{InMemoryUserRepository, UserParams, UserRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = InMemoryUserRepository::new();
//!
//!     let mut tx = repo.begin().await?;
//!     let user = tx
//!         .create_or_update(
//!             UserParams {
//!                 username: "alice".into(),
//!                 email: "alice@example.com".into(),
//!                 firstname: "Alice".into(),
//!                 lastname: "Smith".into(),
//!                 active: true,
//!                 admin: false,
//!                 extern_name: "uid=alice,ou=people".into(),
//!                 extern_type: "ldap".into(),
//!                 password_hash: String::new(),
//!             },
//!             true,
//!         )
//!         .await?;
//!     tx.enforce_plugin_owned_groups(&user, &["developers".into()], "ldap").await?;
//!     tx.commit().await?;
//!
//!     assert!(repo.get_by_username("ALICE", true).await?.is_some());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod models;
pub mod repository;

pub use error::*;
pub use models::*;
pub use repository::*;
