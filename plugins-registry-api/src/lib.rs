//! Authentication plugin registry
//!
//! Owns the instantiated plugins of one configuration generation and
//! answers which of them should be asked, and in what order:
//! - Registration is guarded: an identifier can only be registered once
//! - Authentication order is the settings store's enabled list, filtered to
//!   active plugins, with the static fallback plugin always last
//! - Presentation order is by display name
//! - Reloads swap an immutable snapshot through [`RegistryHandle`]
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = RegistryBuilder::new()
//!     .plugins(BuiltinPlugin::all(&sources))
//!     .fallback(Some("rhodecode".into()))
//!     .build()?;
//! let handle = RegistryHandle::new(registry);
//!
//! let order = handle.snapshot().get_plugins_for_authentication(&ctx).await?;
//! ```

pub mod builder;
pub mod error;
pub mod registry;

pub use builder::*;
pub use error::*;
pub use registry::*;
