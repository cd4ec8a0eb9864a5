//! Authentication plugin contract for the authentication chain
//!
//! This module defines what every identity source must provide and the
//! behaviour shared by all of them:
//! - The [`AuthPlugin`] trait: identity, settings schema, user resolution,
//!   the acceptance gate and the `auth()` credential check
//! - Typed outcomes: a plugin either authenticates, rejects, or fails with a
//!   [`PluginError`] such as an unreachable identity source
//! - Validation of returned identities against the required attribute set
//! - Opportunistic password-hash migration after a successful login
//! - The external-identity base: creating or refreshing the local user and
//!   synchronising the groups a plugin owns, in one unit of work
//!
//! # Plugin Kinds
//!
//! - **Internal plugins** check credentials against the local user table and
//!   never create users
//! - **External plugins** return an [`ExternalPolicy`] and have their
//!   identities materialised as local users
//! - **Container plugins** read the identity from the request environment
//!   and are the only plugins asked when no credentials were supplied
//!
//! # Example
//!
//! ```rust
//! use plugin_runtime_core::{allows_authentication_from, AcceptanceRules, Channel};
//! use auth_identity::LocalUser;
//!
//! let alice = LocalUser::new(1, "alice").with_extern_type("rhodecode");
//!
//! // A user owned by one plugin is never authenticated by another.
//! assert!(!allows_authentication_from("ldap", Some(&alice), Channel::Http, &AcceptanceRules::default()));
//! assert!(allows_authentication_from("rhodecode", Some(&alice), Channel::Http, &AcceptanceRules::default()));
//! ```

pub mod authenticate;
pub mod context;
pub mod contract;
pub mod error;
pub mod external;
pub mod identity;
pub mod schema;

pub use authenticate::*;
pub use context::*;
pub use contract::*;
pub use error::*;
pub use external::*;
pub use identity::*;
pub use schema::*;
