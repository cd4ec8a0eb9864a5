use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use auth_identity::LocalUser;
use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Request environment handed to container-style plugins (CGI-style keys
/// such as `REMOTE_USER`).
pub type Environ = HashMap<String, String>;

/// Context of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Interactive web login
    Http,
    /// git/hg/svn wire protocol
    Vcs,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Http, Channel::Vcs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Vcs => "vcs",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" | "HTTP" => Ok(Self::Http),
            "vcs" | "VCS" => Ok(Self::Vcs),
            other => Err(ContractError::InvalidChannel(other.to_string())),
        }
    }
}

/// Opaque identifier of a plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The record a successful authentication produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttributes {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub groups: BTreeSet<String>,
    /// Identifier of the principal at the identity source
    pub extern_name: String,
    pub extern_type: String,
    pub admin: bool,
    pub active: bool,
    /// Activation reported by the source; `None` defers to local policy.
    pub active_from_extern: Option<bool>,
}

/// What a plugin's `auth()` hands back before validation.
///
/// Every field is optional so that a plugin forgetting one is detected by
/// [`RawIdentity::validate`] instead of being filled with a silent default.
/// `active_from_extern` is doubly optional: the outer layer records whether
/// the plugin supplied it at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawIdentity {
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub groups: Option<Vec<String>>,
    pub extern_name: Option<String>,
    pub extern_type: Option<String>,
    pub admin: Option<bool>,
    pub active: Option<bool>,
    pub active_from_extern: Option<Option<bool>>,
    /// Replacement password hash to store after a successful legacy match
    pub hash_migrate: Option<String>,
}

impl RawIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attribute taken from a local user record, with no groups and
    /// the account's own active flag reported as the source's.
    pub fn from_user(user: &LocalUser) -> Self {
        Self::new()
            .username(&user.username)
            .firstname(&user.firstname)
            .lastname(&user.lastname)
            .email(&user.email)
            .groups(Vec::<String>::new())
            .admin(user.admin)
            .active(user.active)
            .active_from_extern(Some(user.active))
            .extern_name(user.user_id.to_string())
            .extern_type(user.extern_type.clone().unwrap_or_default())
    }

    pub fn username(mut self, value: impl Into<String>) -> Self {
        self.username = Some(value.into());
        self
    }

    pub fn firstname(mut self, value: impl Into<String>) -> Self {
        self.firstname = Some(value.into());
        self
    }

    pub fn lastname(mut self, value: impl Into<String>) -> Self {
        self.lastname = Some(value.into());
        self
    }

    pub fn email(mut self, value: impl Into<String>) -> Self {
        self.email = Some(value.into());
        self
    }

    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn extern_name(mut self, value: impl Into<String>) -> Self {
        self.extern_name = Some(value.into());
        self
    }

    pub fn extern_type(mut self, value: impl Into<String>) -> Self {
        self.extern_type = Some(value.into());
        self
    }

    pub fn admin(mut self, value: bool) -> Self {
        self.admin = Some(value);
        self
    }

    pub fn active(mut self, value: bool) -> Self {
        self.active = Some(value);
        self
    }

    pub fn active_from_extern(mut self, value: Option<bool>) -> Self {
        self.active_from_extern = Some(value);
        self
    }

    pub fn hash_migrate(mut self, new_hash: impl Into<String>) -> Self {
        self.hash_migrate = Some(new_hash.into());
        self
    }

    /// Names of required attributes that are absent. An empty username
    /// counts as absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.username.as_deref().map_or(true, str::is_empty) {
            missing.push("username");
        }
        if self.firstname.is_none() {
            missing.push("firstname");
        }
        if self.lastname.is_none() {
            missing.push("lastname");
        }
        if self.email.is_none() {
            missing.push("email");
        }
        if self.groups.is_none() {
            missing.push("groups");
        }
        if self.extern_name.is_none() {
            missing.push("extern_name");
        }
        if self.extern_type.is_none() {
            missing.push("extern_type");
        }
        if self.admin.is_none() {
            missing.push("admin");
        }
        if self.active.is_none() {
            missing.push("active");
        }
        if self.active_from_extern.is_none() {
            missing.push("active_from_extern");
        }
        missing
    }

    /// Check the record against the required attribute set.
    pub fn validate(self, plugin: &str) -> Result<IdentityAttributes, ContractError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(ContractError::MalformedIdentity {
                plugin: plugin.to_string(),
                missing,
            });
        }
        Ok(IdentityAttributes {
            username: self.username.unwrap_or_default(),
            firstname: self.firstname.unwrap_or_default(),
            lastname: self.lastname.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            groups: self.groups.unwrap_or_default().into_iter().collect(),
            extern_name: self.extern_name.unwrap_or_default(),
            extern_type: self.extern_type.unwrap_or_default(),
            admin: self.admin.unwrap_or_default(),
            active: self.active.unwrap_or_default(),
            active_from_extern: self.active_from_extern.flatten(),
        })
    }
}

/// Why a plugin declined to authenticate. Never shown to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Username or password empty, or not acceptable to the source
    MalformedCredentials,
    UnknownPrincipal,
    BadCredentials,
    AccountDisabled,
    /// The source says the account is deactivated
    InactiveAtSource,
    /// Nothing in the request identifies a user
    NoIdentity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MalformedCredentials => "malformed credentials",
            Self::UnknownPrincipal => "unknown principal",
            Self::BadCredentials => "bad credentials",
            Self::AccountDisabled => "account disabled",
            Self::InactiveAtSource => "inactive at identity source",
            Self::NoIdentity => "no identity in request",
        };
        f.write_str(text)
    }
}

/// Result of a plugin's credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(RawIdentity),
    Rejected(RejectReason),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}
