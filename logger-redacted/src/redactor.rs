use base64::{engine::general_purpose, Engine as _};
use error_common::DataSanitizer;
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref BASIC_AUTH_REGEX: Option<Regex> =
        Regex::new(r"(?i)(authorization:\s*basic\s+)([A-Za-z0-9+/=]+)").ok();
    static ref BEARER_REGEX: Option<Regex> =
        Regex::new(r"(?i)(authorization:\s*bearer\s+)([A-Za-z0-9._~+/=-]+)").ok();
    static ref TOKEN_REGEX: Option<Regex> = Regex::new(r"\b[0-9a-f]{40}\b").ok();
}

/// Secret redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_credential_fields: bool,
    pub redact_authorization_headers: bool,
    pub redact_tokens: bool,
    pub hash_for_correlation: bool,
    pub extra_fields: Vec<String>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_credential_fields: true,
            redact_authorization_headers: true,
            redact_tokens: true,
            hash_for_correlation: true,
            extra_fields: Vec::new(),
        }
    }
}

/// Redacts secrets (passwords, bind passwords, auth tokens, basic-auth
/// headers) from text headed for a log line.
pub struct SecretRedactor {
    config: RedactionConfig,
    sanitizer: DataSanitizer,
}

impl SecretRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        let sanitizer = config
            .extra_fields
            .iter()
            .fold(DataSanitizer::new(), |s, field| s.with_field(field.clone()));
        Self { config, sanitizer }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_credential_fields {
            result = self.sanitizer.sanitize_for_logging(&result);
        }

        if self.config.redact_authorization_headers {
            result = self.redact_with(&BASIC_AUTH_REGEX, &result, "BASIC");
            result = self.redact_with(&BEARER_REGEX, &result, "BEARER");
        }

        if self.config.redact_tokens {
            if let Some(regex) = TOKEN_REGEX.as_ref() {
                result = regex
                    .replace_all(&result, |caps: &regex::Captures| self.mask("TOKEN", &caps[0]))
                    .into_owned();
            }
        }

        result
    }

    fn redact_with(&self, regex: &Option<Regex>, text: &str, label: &str) -> String {
        match regex {
            Some(regex) => regex
                .replace_all(text, |caps: &regex::Captures| {
                    format!("{}{}", &caps[1], self.mask(label, &caps[2]))
                })
                .into_owned(),
            None => text.to_string(),
        }
    }

    fn mask(&self, label: &str, value: &str) -> String {
        if self.config.hash_for_correlation {
            format!("{}[{}]", label, Self::hash_value(value))
        } else {
            format!("{}[REDACTED]", label)
        }
    }

    /// Short correlation id for a secret; equal inputs give equal ids.
    pub fn hash_value(value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        let result = hasher.finalize();
        general_purpose::STANDARD.encode(result.get(..8).unwrap_or_default())
    }
}

impl Default for SecretRedactor {
    fn default() -> Self {
        Self::new(RedactionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header_redaction() {
        let redactor = SecretRedactor::new(RedactionConfig {
            hash_for_correlation: false,
            ..Default::default()
        });

        let text = "Authorization: Basic YXBwOnNlY3JldA==";
        let redacted = redactor.redact(text);
        assert_eq!(redacted, "Authorization: Basic BASIC[REDACTED]");
    }

    #[test]
    fn test_token_hash_is_stable() {
        let redactor = SecretRedactor::default();
        let token = "0123456789abcdef0123456789abcdef01234567";

        let first = redactor.redact(&format!("token used {}", token));
        let second = redactor.redact(&format!("again {}", token));
        assert!(!first.contains(token));

        let id = SecretRedactor::hash_value(token);
        assert!(first.contains(&id));
        assert!(second.contains(&id));
    }

    #[test]
    fn test_password_field_redaction() {
        let redactor = SecretRedactor::default();
        let redacted = redactor.redact("bind_pass=topsecret host=ldap.local");
        assert!(!redacted.contains("topsecret"));
        assert!(redacted.contains("host=ldap.local"));
    }
}
