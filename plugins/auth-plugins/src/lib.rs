//! Built-in authentication plugins
//!
//! Concrete identity sources for the authentication chain:
//! - **rhodecode**: passwords checked against the local user table, with
//!   transparent migration of legacy hashes
//! - **authtoken**: VCS access with per-user tokens instead of passwords
//! - **headers**: container authentication from proxy-set request headers
//! - **ldap**: directory search and simple bind
//! - **pam**: host PAM stack plus the passwd and group databases
//! - **crowd**: Atlassian CROWD usermanagement REST API
//! - **jasig-cas**: Jasig CAS REST ticket endpoint
//!
//! Remote protocols sit behind small traits ([`LdapConnector`],
//! [`PamService`], [`SystemUserDb`], [`CrowdClient`], [`CasClient`]) so that
//! the plugins can be driven by in-memory or mocked sources.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use auth_plugins::{BuiltinPlugin, PluginKind, PluginSources};
//! use plugin_runtime_core::AuthPlugin;
//!
//! let sources = PluginSources::new(Duration::from_secs(10)).unwrap();
//! let ldap = BuiltinPlugin::build("ldap".parse::<PluginKind>().unwrap(), "corp-ldap", &sources);
//!
//! assert_eq!(ldap.name(), "ldap");
//! assert_eq!(ldap.display_name(), "LDAP");
//! assert!(ldap.allows_creating_users());
//! ```

pub mod authtoken;
pub mod builtin;
pub mod cas;
pub mod crowd;
pub mod headers;
pub mod ldap;
pub mod pam;
pub mod rhodecode;
pub mod source;

pub use authtoken::AuthTokenPlugin;
pub use builtin::{BuiltinPlugin, PluginKind, PluginSources, UnknownPluginKind};
pub use cas::{CasClient, HttpCasClient, JasigCasPlugin};
pub use crowd::{CrowdClient, CrowdPlugin, CrowdServer, CrowdUser, HttpCrowdClient};
pub use headers::HeadersPlugin;
pub use ldap::{LdapAttributes, LdapConfig, LdapConnector, LdapPlugin, StaticDirectory};
pub use pam::{PamPlugin, PamService, StaticPamService, StaticUserDb, SystemUserDb};
pub use rhodecode::RhodeCodePlugin;
pub use source::SourceError;
