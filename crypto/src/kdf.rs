use crate::error::CryptoError;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

/// Key derivation result
pub type KdfResult<T> = Result<T, CryptoError>;

/// Argon2 parameters for password hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (minimum 19456 for Argon2id)
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Params {
    /// Smallest parameters argon2 accepts. Tests and local seeding only.
    pub fn for_testing() -> Self {
        Self {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn build(&self) -> KdfResult<Argon2<'static>> {
        let params = argon2::Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| CryptoError::Configuration(e.to_string()))?;
        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

/// Password key derivation helpers
pub struct Kdf;

impl Kdf {
    /// Hash a password using Argon2id
    ///
    /// Returns the password hash in PHC string format which includes
    /// the algorithm, its parameters, the salt and the hash.
    pub fn argon2_hash(password: &[u8], params: &Argon2Params) -> KdfResult<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());

        let password_hash = params
            .build()?
            .hash_password(password, &salt)
            .map_err(|e| CryptoError::HashFailed(e.to_string()))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against an Argon2 PHC string
    ///
    /// The parameters are read from the PHC string, so hashes created with
    /// older parameters still verify.
    pub fn argon2_verify(password: &[u8], password_hash: &str) -> KdfResult<bool> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| CryptoError::HashFailed(e.to_string()))?;

        Ok(Argon2::default()
            .verify_password(password, &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argon2_hash_verify() {
        let password = b"secure_password_123";
        let params = Argon2Params::for_testing();

        let hash = Kdf::argon2_hash(password, &params).unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(Kdf::argon2_verify(password, &hash).unwrap());
        assert!(!Kdf::argon2_verify(b"wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_argon2_salts_differ() {
        let params = Argon2Params::for_testing();
        let first = Kdf::argon2_hash(b"same", &params).unwrap();
        let second = Kdf::argon2_hash(b"same", &params).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_phc_string() {
        assert!(Kdf::argon2_verify(b"pw", "not-a-phc-string").is_err());
    }
}
