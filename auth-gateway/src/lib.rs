//! Authentication orchestrator for the authentication chain
//!
//! The single entry point used by login flows and the VCS request path:
//! - Plugins are asked strictly in the registry's authentication order and
//!   the first successful plugin wins
//! - Credential-less attempts with a request environment only reach
//!   container plugins
//! - Per-plugin result cache keyed by the full credential tuple, with a
//!   single in-flight computation per key
//! - Optional per-plugin call timeout and a configurable policy for
//!   unreachable identity sources
//! - A login surface that reduces every failure to one user-visible outcome
//!
//! # Example
//!
//! ```rust,ignore
//! let authenticator = Authenticator::new(handle, ctx).with_config(&config);
//!
//! match authenticator.authenticate("alice", "secret", None, "http", false).await? {
//!     Some(identity) => println!("welcome {}", identity.username),
//!     None => println!("invalid user name or password"),
//! }
//! ```

pub mod authenticator;
pub mod cache;
pub mod error;
pub mod login;

pub use authenticator::*;
pub use cache::*;
pub use error::*;
pub use login::*;
