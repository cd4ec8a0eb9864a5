use std::collections::BTreeMap;

use config_engine::{SettingKind, SettingValue};
use serde::Serialize;

use crate::error::ContractError;

/// Setting that turns a plugin on for authentication.
pub const ENABLED_SETTING: &str = "enabled";
/// Per-plugin cache lifetime in seconds; `0` disables caching.
pub const CACHE_TTL_SETTING: &str = "cache_ttl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    Range { min: i64, max: Option<i64> },
    OneOf(Vec<String>),
}

impl Validator {
    pub fn one_of<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(choices.into_iter().map(Into::into).collect())
    }

    fn check(&self, setting: &str, value: &SettingValue) -> Result<(), ContractError> {
        let invalid = |reason: String| ContractError::InvalidSetting {
            setting: setting.to_string(),
            reason,
        };
        match self {
            Self::Range { min, max } => {
                let n = value.as_int().ok_or_else(|| invalid("expected an integer".into()))?;
                if n < *min || max.is_some_and(|max| n > max) {
                    return Err(invalid(format!("{} is out of range", n)));
                }
            }
            Self::OneOf(choices) => {
                let text = value.to_string();
                if !choices.iter().any(|c| *c == text) {
                    return Err(invalid(format!("`{}` is not one of {}", text, choices.join(", "))));
                }
            }
        }
        Ok(())
    }
}

/// One recognised plugin setting.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaNode {
    pub name: String,
    pub kind: SettingKind,
    pub default: SettingValue,
    pub title: String,
    pub description: String,
    /// Stored encrypted at rest
    pub encrypted: bool,
    pub validator: Option<Validator>,
}

impl SchemaNode {
    fn new(name: &str, kind: SettingKind, default: SettingValue) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default,
            title: name.to_string(),
            description: String::new(),
            encrypted: false,
            validator: None,
        }
    }

    pub fn string(name: &str, default: &str) -> Self {
        Self::new(name, SettingKind::Str, SettingValue::from(default))
    }

    pub fn int(name: &str, default: i64) -> Self {
        Self::new(name, SettingKind::Int, SettingValue::Int(default))
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self::new(name, SettingKind::Bool, SettingValue::Bool(default))
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn validated(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Convert `value` to this node's type and run the validator.
    pub fn coerce(&self, value: SettingValue) -> Result<SettingValue, ContractError> {
        let value = if value.kind() == self.kind {
            value
        } else {
            SettingValue::parse_as(self.kind, &value.to_string()).map_err(|e| ContractError::InvalidSetting {
                setting: self.name.clone(),
                reason: e.to_string(),
            })?
        };
        if let Some(validator) = &self.validator {
            validator.check(&self.name, &value)?;
        }
        Ok(value)
    }
}

/// Declarative description of a plugin's settings.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsSchema {
    nodes: Vec<SchemaNode>,
}

impl SettingsSchema {
    /// The settings every plugin has: `enabled` and `cache_ttl`.
    pub fn base() -> Self {
        Self {
            nodes: vec![
                SchemaNode::boolean(ENABLED_SETTING, false)
                    .titled("Enabled")
                    .described("Enable or disable this authentication plugin."),
                SchemaNode::int(CACHE_TTL_SETTING, 0)
                    .titled("Auth Cache TTL")
                    .described("Seconds to cache the authentication call for this plugin (0 means disabled).")
                    .validated(Validator::Range { min: 0, max: None }),
            ],
        }
    }

    pub fn with_node(mut self, node: SchemaNode) -> Self {
        self.nodes.retain(|n| n.name != node.name);
        self.nodes.push(node);
        self
    }

    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn is_encrypted(&self, name: &str) -> bool {
        self.node(name).is_some_and(|n| n.encrypted)
    }
}

impl Default for SettingsSchema {
    fn default() -> Self {
        Self::base()
    }
}

/// A plugin's settings as loaded for one authentication attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginSettings {
    values: BTreeMap<String, SettingValue>,
}

impl PluginSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<SettingValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: SettingValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// String value, or empty when absent or not textual.
    pub fn get_str(&self, name: &str) -> String {
        self.get(name).map(ToString::to_string).unwrap_or_default()
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SettingValue::as_int)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(SettingValue::as_bool).unwrap_or(false)
    }

    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.get(name).and_then(SettingValue::as_list).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_schema_nodes() {
        let schema = SettingsSchema::base();
        let names: Vec<_> = schema.nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["enabled", "cache_ttl"]);
        assert_eq!(schema.node("cache_ttl").unwrap().default, SettingValue::Int(0));
    }

    #[test]
    fn test_coerce_parses_text() {
        let node = SchemaNode::int("port", 389).validated(Validator::Range { min: 0, max: Some(65536) });
        assert_eq!(node.coerce(SettingValue::from("636")).unwrap(), SettingValue::Int(636));
        assert!(node.coerce(SettingValue::from("70000")).is_err());
        assert!(node.coerce(SettingValue::from("abc")).is_err());
    }

    #[test]
    fn test_one_of_validator() {
        let node = SchemaNode::string("tls_kind", "PLAIN").validated(Validator::one_of(["PLAIN", "LDAPS"]));
        assert!(node.coerce(SettingValue::from("LDAPS")).is_ok());
        assert!(matches!(
            node.coerce(SettingValue::from("SSL")),
            Err(ContractError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_negative_cache_ttl_rejected() {
        let schema = SettingsSchema::base();
        assert!(schema.node("cache_ttl").unwrap().coerce(SettingValue::Int(-1)).is_err());
    }

    #[test]
    fn test_with_node_replaces_same_name() {
        let schema = SettingsSchema::base().with_node(SchemaNode::int("cache_ttl", 30));
        assert_eq!(schema.nodes().len(), 2);
        assert_eq!(schema.node("cache_ttl").unwrap().default, SettingValue::Int(30));
    }

    #[test]
    fn test_plugin_settings_accessors() {
        let settings = PluginSettings::new()
            .with("host", "ldap.example.com")
            .with("port", 389_i64)
            .with("clean_username", "true")
            .with("admin_groups", "admins, ops");

        assert_eq!(settings.get_str("host"), "ldap.example.com");
        assert_eq!(settings.get_int("port"), Some(389));
        assert!(settings.get_bool("clean_username"));
        assert_eq!(settings.get_list("admin_groups"), vec!["admins", "ops"]);
        assert_eq!(settings.get_str("missing"), "");
    }
}
