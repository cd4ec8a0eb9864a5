use crate::error::CryptoError;

/// Result type for encryption operations
pub type EncryptionResult<T> = Result<T, CryptoError>;

/// Reversible encryption of short secrets kept at rest, such as the bind
/// password of a directory server.
pub trait SecretCipher: Send + Sync {
    fn encrypt_str(&self, plaintext: &str) -> EncryptionResult<String>;

    fn decrypt_str(&self, ciphertext: &str) -> EncryptionResult<String>;

    /// Get the encryption algorithm name
    fn algorithm(&self) -> &str;
}
