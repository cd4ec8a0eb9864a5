//! Settings management for the authentication chain
//!
//! Two kinds of configuration live here:
//! - The dynamic **settings store**: namespaced key/value plugin settings and
//!   the ordered list of enabled plugins, optionally encrypted at rest, read
//!   afresh on every authentication attempt so changes need no restart
//! - The static **process configuration**: fallback plugin, per-plugin call
//!   timeout, connectivity policy and logging, loaded once from a file and
//!   `AUTHCHAIN__*` environment variables
//!
//! # Example
//!
//! ```rust
//! use config_engine::{InMemorySettingsStore, SettingsStore, SettingValue, SettingType, SettingKind, plugin_setting_key};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemorySettingsStore::ephemeral()?;
//!     store.set_enabled_plugin_ids(vec!["rhodecode".into(), "ldap".into()]).await?;
//!
//!     let key = plugin_setting_key("ldap", "dn_pass");
//!     store
//!         .create_or_update_setting(&key, SettingValue::from("s3cret"), SettingType::encrypted(SettingKind::Str))
//!         .await?;
//!
//!     assert_eq!(store.get_setting(&key).await?, Some(SettingValue::from("s3cret")));
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod settings;
pub mod store;

pub use engine::*;
pub use error::*;
pub use settings::*;
pub use store::*;
