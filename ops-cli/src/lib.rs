//! Operator CLI for the authentication chain
//!
//! The `authchain` binary wires the whole chain over in-memory stores seeded
//! from a YAML file and lets an operator:
//! - run an authentication attempt over either channel, with or without a
//!   request environment
//! - list plugins with their enabled and active flags
//! - read and write plugin settings through the plugin schemas
//! - set the enabled plugin list, which is the authentication order
//!
//! Mutating commands write the resulting state back to the seed file so that
//! successive invocations build on each other.
//!
//! # Example Usage
//!
//! ```bash
//! authchain --seed seed.yaml plugins enable rhodecode authtoken
//! authchain --seed seed.yaml plugins set ldap host ldap.example.com
//! authchain --seed seed.yaml authenticate -u alice -p secret
//! authchain --seed seed.yaml authenticate --header REMOTE_USER=bob --skip-missing
//! ```

pub mod cli;
pub mod commands;
pub mod seed;

pub use cli::{Cli, Commands, PluginCommands};
pub use commands::Engine;
pub use seed::{Seed, SeedUser};
