use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Setting holding the ordered list of enabled plugin ids.
pub const ENABLED_PLUGINS_KEY: &str = "auth_plugins";

const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Full storage key of a plugin setting: `auth_<plugin name>_<setting>`.
pub fn plugin_setting_key(plugin_name: &str, setting: &str) -> String {
    format!("auth_{}_{}", plugin_name, setting)
}

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Bool(_) => SettingKind::Bool,
            Self::Int(_) => SettingKind::Int,
            Self::Str(_) => SettingKind::Str,
            Self::List(_) => SettingKind::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; numeric strings are accepted.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view; the usual textual spellings are accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "y" | "t" | "1" => Some(true),
                "false" | "no" | "off" | "n" | "f" | "0" | "" => Some(false),
                _ => None,
            },
            Self::List(_) => None,
        }
    }

    /// List view; comma separated strings are split.
    pub fn as_list(&self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => Some(items.clone()),
            Self::Str(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Parse operator input into a value of `kind`.
    pub fn parse_as(kind: SettingKind, raw: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::ValidationError {
            key: raw.to_string(),
            reason: reason.to_string(),
        };
        let text = Self::Str(raw.to_string());
        match kind {
            SettingKind::Str => Ok(text),
            SettingKind::Int => text
                .as_int()
                .map(Self::Int)
                .ok_or_else(|| invalid("expected an integer")),
            SettingKind::Bool => text
                .as_bool()
                .map(Self::Bool)
                .ok_or_else(|| invalid("expected a boolean")),
            SettingKind::List => text.as_list().map(Self::List).ok_or_else(|| invalid("expected a list")),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    Str,
    Int,
    Bool,
    List,
}

impl SettingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::List => "list",
        }
    }
}

/// Storage type hint: value kind plus the `.encrypted` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingType {
    pub kind: SettingKind,
    pub encrypted: bool,
}

impl SettingType {
    pub fn plain(kind: SettingKind) -> Self {
        Self {
            kind,
            encrypted: false,
        }
    }

    pub fn encrypted(kind: SettingKind) -> Self {
        Self {
            kind,
            encrypted: true,
        }
    }

    /// Type inferred from the value, encrypted when the setting is sensitive.
    pub fn infer(value: &SettingValue, sensitive: bool) -> Self {
        Self {
            kind: value.kind(),
            encrypted: sensitive,
        }
    }
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.encrypted {
            write!(f, "{}{}", self.kind.as_str(), ENCRYPTED_SUFFIX)
        } else {
            write!(f, "{}", self.kind.as_str())
        }
    }
}

impl FromStr for SettingType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let (base, encrypted) = match s.strip_suffix(ENCRYPTED_SUFFIX) {
            Some(base) => (base, true),
            None => (s, false),
        };
        let kind = match base {
            "str" | "unicode" => SettingKind::Str,
            "int" => SettingKind::Int,
            "bool" => SettingKind::Bool,
            "list" => SettingKind::List,
            other => return Err(ConfigError::UnknownSettingType(other.to_string())),
        };
        Ok(Self { kind, encrypted })
    }
}
