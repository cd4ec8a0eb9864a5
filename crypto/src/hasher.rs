//! Credential hashing with upgrade-on-login.
//!
//! New hashes are Argon2id. Stored bcrypt and hex SHA-256 hashes still
//! verify, and a successful match against one of them yields a replacement
//! Argon2id hash that the caller is expected to persist.

use crate::error::CryptoResult;
use crate::kdf::{Argon2Params, Kdf};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Stored-hash families understood by [`UpgradingHasher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Argon2id,
    Bcrypt,
    Sha256Hex,
    Unknown,
}

impl HashScheme {
    pub fn detect(stored_hash: &str) -> Self {
        if stored_hash.starts_with("$argon2") {
            Self::Argon2id
        } else if ["$2a$", "$2b$", "$2y$"]
            .iter()
            .any(|prefix| stored_hash.starts_with(prefix))
        {
            Self::Bcrypt
        } else if stored_hash.len() == 64 && stored_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::Sha256Hex
        } else {
            Self::Unknown
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Bcrypt | Self::Sha256Hex)
    }
}

/// Password-hash verification and creation.
pub trait CredentialHasher: Send + Sync {
    /// Returns whether `password` matches `stored_hash`, and a replacement
    /// hash when the stored one uses a deprecated scheme.
    fn verify_and_maybe_upgrade(
        &self,
        password: &str,
        stored_hash: &str,
    ) -> CryptoResult<(bool, Option<String>)>;

    fn create_hash(&self, password: &str) -> CryptoResult<String>;

    fn verify(&self, password: &str, stored_hash: &str) -> CryptoResult<bool> {
        self.verify_and_maybe_upgrade(password, stored_hash)
            .map(|(matches, _)| matches)
    }
}

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn secrets_match(candidate: &str, expected: &str) -> bool {
    candidate.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Argon2id hasher that upgrades bcrypt and SHA-256 hashes on login.
#[derive(Debug, Clone, Default)]
pub struct UpgradingHasher {
    params: Argon2Params,
}

impl UpgradingHasher {
    pub fn new(params: Argon2Params) -> Self {
        Self { params }
    }

    fn check_legacy(password: &str, stored_hash: &str, scheme: HashScheme) -> bool {
        match scheme {
            HashScheme::Bcrypt => bcrypt::verify(password, stored_hash).unwrap_or(false),
            HashScheme::Sha256Hex => {
                let computed = legacy::sha256_hex(password);
                secrets_match(&computed, &stored_hash.to_ascii_lowercase())
            }
            HashScheme::Argon2id | HashScheme::Unknown => false,
        }
    }
}

impl CredentialHasher for UpgradingHasher {
    fn verify_and_maybe_upgrade(
        &self,
        password: &str,
        stored_hash: &str,
    ) -> CryptoResult<(bool, Option<String>)> {
        let scheme = HashScheme::detect(stored_hash);
        match scheme {
            HashScheme::Argon2id => match Kdf::argon2_verify(password.as_bytes(), stored_hash) {
                Ok(matches) => Ok((matches, None)),
                Err(e) => {
                    warn!(error = %e, "stored argon2 hash is malformed");
                    Ok((false, None))
                }
            },
            HashScheme::Bcrypt | HashScheme::Sha256Hex => {
                if !Self::check_legacy(password, stored_hash, scheme) {
                    return Ok((false, None));
                }
                debug!(?scheme, "legacy hash matched, issuing argon2id replacement");
                let upgraded = self.create_hash(password)?;
                Ok((true, Some(upgraded)))
            }
            HashScheme::Unknown => Ok((false, None)),
        }
    }

    fn create_hash(&self, password: &str) -> CryptoResult<String> {
        Kdf::argon2_hash(password.as_bytes(), &self.params)
    }
}

/// Helpers for producing hashes in the deprecated formats, used when
/// importing existing accounts.
pub mod legacy {
    use super::*;
    use crate::error::CryptoError;

    pub fn sha256_hex(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    pub fn bcrypt_hash(password: &str, cost: u32) -> CryptoResult<String> {
        bcrypt::hash(password, cost).map_err(|e| CryptoError::HashFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> UpgradingHasher {
        UpgradingHasher::new(Argon2Params::for_testing())
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("tok-vcs", "tok-vcs"));
        assert!(!secrets_match("tok-vcs", "tok-vcX"));
        assert!(!secrets_match("tok", "tok-vcs"));
        assert!(!secrets_match("", "tok-vcs"));
    }

    #[test]
    fn test_detect_schemes() {
        assert_eq!(HashScheme::detect("$argon2id$v=19$m=8,t=1,p=1$abc$def"), HashScheme::Argon2id);
        assert_eq!(HashScheme::detect("$2b$10$abcdefghijklmnopqrstuu"), HashScheme::Bcrypt);
        assert_eq!(HashScheme::detect(&legacy::sha256_hex("x")), HashScheme::Sha256Hex);
        assert_eq!(HashScheme::detect("plain"), HashScheme::Unknown);
    }

    #[test]
    fn test_current_hash_is_not_upgraded() {
        let hasher = hasher();
        let stored = hasher.create_hash("correct horse").unwrap();

        let (matches, upgraded) = hasher.verify_and_maybe_upgrade("correct horse", &stored).unwrap();
        assert!(matches);
        assert!(upgraded.is_none());

        let (matches, upgraded) = hasher.verify_and_maybe_upgrade("wrong", &stored).unwrap();
        assert!(!matches);
        assert!(upgraded.is_none());
    }

    #[test]
    fn test_sha256_hash_is_upgraded_on_match() {
        let hasher = hasher();
        let stored = legacy::sha256_hex("old-password");

        let (matches, upgraded) = hasher.verify_and_maybe_upgrade("old-password", &stored).unwrap();
        assert!(matches);
        let upgraded = upgraded.unwrap();
        assert_eq!(HashScheme::detect(&upgraded), HashScheme::Argon2id);
        assert!(hasher.verify("old-password", &upgraded).unwrap());

        let (matches, upgraded) = hasher.verify_and_maybe_upgrade("nope", &stored).unwrap();
        assert!(!matches);
        assert!(upgraded.is_none());
    }

    #[test]
    fn test_bcrypt_hash_is_upgraded_on_match() {
        let hasher = hasher();
        let stored = legacy::bcrypt_hash("bcrypt-pw", 4).unwrap();

        let (matches, upgraded) = hasher.verify_and_maybe_upgrade("bcrypt-pw", &stored).unwrap();
        assert!(matches);
        assert!(upgraded.is_some());
    }

    #[test]
    fn test_unknown_hash_never_matches() {
        let (matches, upgraded) = hasher().verify_and_maybe_upgrade("pw", "pw").unwrap();
        assert!(!matches);
        assert!(upgraded.is_none());
    }
}
