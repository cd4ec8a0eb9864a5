// Sanitization utilities
// Masks credential material in free-form text before it is logged or returned.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CREDENTIAL_FIELD_REGEX: Option<Regex> = Regex::new(
        r#"(?i)("?(?:password|passwd|dn_pass|app_password|bind_pass|token|api_key)"?\s*[:=]\s*)("[^"]*"|[^\s,&}]+)"#
    )
    .ok();
}

const MASK: &str = "***";

pub struct DataSanitizer {
    extra_fields: Vec<String>,
}

impl DataSanitizer {
    pub fn new() -> Self {
        Self {
            extra_fields: Vec::new(),
        }
    }

    /// Also mask `name=value` pairs for the given field name.
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.extra_fields.push(name.into().to_lowercase());
        self
    }

    pub fn sanitize_for_logging(&self, data: &str) -> String {
        let mut result = match CREDENTIAL_FIELD_REGEX.as_ref() {
            Some(regex) => regex
                .replace_all(data, |caps: &regex::Captures| format!("{}{}", &caps[1], MASK))
                .into_owned(),
            None => MASK.to_string(),
        };

        for field in &self.extra_fields {
            let pattern = format!(r"(?i)({}\s*[:=]\s*)([^\s,&}}]+)", regex::escape(field));
            if let Ok(regex) = Regex::new(&pattern) {
                result = regex
                    .replace_all(&result, |caps: &regex::Captures| format!("{}{}", &caps[1], MASK))
                    .into_owned();
            }
        }

        result
    }
}

impl Default for DataSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_password_pairs() {
        let sanitizer = DataSanitizer::new();
        let out = sanitizer.sanitize_for_logging("username=alice&password=hunter2");
        assert_eq!(out, "username=alice&password=***");
    }

    #[test]
    fn test_masks_json_fields() {
        let sanitizer = DataSanitizer::new();
        let out = sanitizer.sanitize_for_logging(r#"{"dn_pass": "secret", "host": "ldap"}"#);
        assert!(!out.contains("secret"));
        assert!(out.contains("ldap"));
    }

    #[test]
    fn test_extra_field() {
        let sanitizer = DataSanitizer::new().with_field("pin");
        let out = sanitizer.sanitize_for_logging("pin=1234 user=bob");
        assert_eq!(out, "pin=*** user=bob");
    }
}
