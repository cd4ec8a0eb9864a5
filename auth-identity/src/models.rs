use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Username of the anonymous account.
pub const DEFAULT_USER: &str = "default";

/// Global permission names consulted by plugin activation policies.
pub mod permissions {
    /// New accounts registered against the internal database start active.
    pub const REGISTER_AUTO_ACTIVATE: &str = "hg.register.auto_activate";
    /// New accounts materialised from an external source start active.
    pub const EXTERN_ACTIVATE_AUTO: &str = "hg.extern_activate.auto";
}

/// A local user record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub user_id: u64,
    pub username: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub admin: bool,
    /// Name of the plugin that owns this account, if any.
    #[serde(default)]
    pub extern_type: Option<String>,
    #[serde(default)]
    pub extern_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl LocalUser {
    pub fn new(user_id: u64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            firstname: String::new(),
            lastname: String::new(),
            email: String::new(),
            password_hash: String::new(),
            active: true,
            admin: false,
            extern_type: None,
            extern_name: None,
        }
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = hash.into();
        self
    }

    pub fn with_extern_type(mut self, extern_type: impl Into<String>) -> Self {
        self.extern_type = Some(extern_type.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_names(mut self, firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        self.firstname = firstname.into();
        self.lastname = lastname.into();
        self
    }

    /// Owning plugin, treating an empty binding as none.
    pub fn bound_extern_type(&self) -> Option<&str> {
        self.extern_type.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_default_user(&self) -> bool {
        self.username == DEFAULT_USER
    }
}

impl fmt::Debug for LocalUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUser")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("active", &self.active)
            .field("admin", &self.admin)
            .field("extern_type", &self.extern_type)
            .field("extern_name", &self.extern_name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for LocalUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<User('id:{}:{}')>", self.user_id, self.username)
    }
}

/// Parameters for creating or updating a local user from an identity source.
#[derive(Clone, PartialEq, Eq)]
pub struct UserParams {
    pub username: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub active: bool,
    pub admin: bool,
    pub extern_name: String,
    pub extern_type: String,
    pub password_hash: String,
}

impl fmt::Debug for UserParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserParams")
            .field("username", &self.username)
            .field("active", &self.active)
            .field("admin", &self.admin)
            .field("extern_type", &self.extern_type)
            .finish_non_exhaustive()
    }
}

/// A user group. Groups with an owning plugin are managed by that plugin's
/// group synchronisation; the rest are only changed by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub managed_by: Option<String>,
    #[serde(default)]
    pub members: BTreeSet<String>,
}

impl UserGroup {
    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            managed_by: None,
            members: BTreeSet::new(),
        }
    }

    pub fn managed(name: impl Into<String>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            name: name.into(),
            description: format!("Automatically created from plugin:{}", owner),
            managed_by: Some(owner),
            members: BTreeSet::new(),
        }
    }

    pub fn with_member(mut self, username: impl Into<String>) -> Self {
        self.members.insert(username.into());
        self
    }

    pub fn is_managed_by(&self, owner: &str) -> bool {
        self.managed_by.as_deref() == Some(owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRole {
    Http,
    Vcs,
    Api,
    Feed,
    All,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub role: TokenRole,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, role: TokenRole) -> Self {
        Self {
            token: token.into(),
            role,
            expires_at: None,
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_valid_for(&self, role: TokenRole, now: DateTime<Utc>) -> bool {
        let role_ok = self.role == role || self.role == TokenRole::All;
        let unexpired = self.expires_at.map_or(true, |at| at > now);
        role_ok && unexpired
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
