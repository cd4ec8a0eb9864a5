use crate::encryption::{EncryptionResult, SecretCipher};
use crate::error::CryptoError;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for encrypted plugin settings.
///
/// Values are stored as `v{version}:{nonce_b64}:{ciphertext_b64}` so the key
/// can be rotated later without guessing which key produced a value.
#[derive(ZeroizeOnDrop)]
pub struct SettingsCipher {
    #[zeroize(skip)]
    cipher: Aes256Gcm,
    key: [u8; KEY_LEN],
    #[zeroize(skip)]
    key_version: u32,
}

impl SettingsCipher {
    pub fn new(key: [u8; KEY_LEN]) -> EncryptionResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self {
            cipher,
            key,
            key_version: 1,
        })
    }

    /// Create from base64-encoded key
    pub fn from_base64(key_b64: &str) -> EncryptionResult<Self> {
        let key_bytes = BASE64
            .decode(key_b64.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let key: [u8; KEY_LEN] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                got: key_bytes.len(),
            })?;

        Self::new(key)
    }

    /// Cipher with a fresh random key; values do not survive a restart.
    pub fn ephemeral() -> EncryptionResult<Self> {
        Self::new(Self::generate_key())
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.key_version = version;
        self
    }

    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    pub fn generate_key_base64() -> String {
        BASE64.encode(Self::generate_key())
    }

    pub fn version(&self) -> u32 {
        self.key_version
    }

    /// True if `value` looks like something this cipher produced.
    pub fn is_encrypted(value: &str) -> bool {
        let mut parts = value.split(':');
        matches!(
            (parts.next(), parts.next(), parts.next(), parts.next()),
            (Some(v), Some(_), Some(_), None)
                if v.strip_prefix('v').is_some_and(|n| n.parse::<u32>().is_ok())
        )
    }
}

impl SecretCipher for SettingsCipher {
    fn encrypt_str(&self, plaintext: &str) -> EncryptionResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "v{}:{}:{}",
            self.key_version,
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    fn decrypt_str(&self, encrypted: &str) -> EncryptionResult<String> {
        let mut parts = encrypted.splitn(3, ':');
        let (Some(version), Some(nonce_b64), Some(ciphertext_b64)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::InvalidFormat);
        };

        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or(CryptoError::InvalidFormat)?;

        if version != self.key_version {
            return Err(CryptoError::UnsupportedKeyVersion {
                version,
                supported: self.key_version,
            });
        }

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|_| CryptoError::InvalidFormat)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonce);
        }

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|_| CryptoError::InvalidFormat)?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    fn algorithm(&self) -> &str {
        "AES-256-GCM"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_setting() {
        let cipher = SettingsCipher::ephemeral().unwrap();

        let encrypted = cipher.encrypt_str("bind-password").unwrap();
        assert!(encrypted.starts_with("v1:"));
        assert!(SettingsCipher::is_encrypted(&encrypted));
        assert_eq!(cipher.decrypt_str(&encrypted).unwrap(), "bind-password");
    }

    #[test]
    fn test_different_nonces() {
        let cipher = SettingsCipher::ephemeral().unwrap();

        let first = cipher.encrypt_str("same plaintext").unwrap();
        let second = cipher.encrypt_str("same plaintext").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_ciphertext() {
        let cipher = SettingsCipher::ephemeral().unwrap();
        let mut encrypted = cipher.encrypt_str("authenticated data").unwrap();
        encrypted.push('A');

        assert!(cipher.decrypt_str(&encrypted).is_err());
    }

    #[test]
    fn test_wrong_version() {
        let key = SettingsCipher::generate_key();
        let v1 = SettingsCipher::new(key).unwrap();
        let v2 = SettingsCipher::new(key).unwrap().with_version(2);

        let encrypted = v1.encrypt_str("version test").unwrap();
        assert!(matches!(
            v2.decrypt_str(&encrypted),
            Err(CryptoError::UnsupportedKeyVersion { version: 1, supported: 2 })
        ));
    }

    #[test]
    fn test_from_base64() {
        let key_b64 = SettingsCipher::generate_key_base64();
        let cipher = SettingsCipher::from_base64(&key_b64).unwrap();
        let encrypted = cipher.encrypt_str("x").unwrap();
        assert_eq!(cipher.decrypt_str(&encrypted).unwrap(), "x");
    }

    #[test]
    fn test_invalid_key_length() {
        let short = BASE64.encode(b"too_short");
        assert!(matches!(
            SettingsCipher::from_base64(&short),
            Err(CryptoError::InvalidKeyLength { expected: 32, got: 9 })
        ));
    }

    #[test]
    fn test_plain_values_are_not_flagged() {
        assert!(!SettingsCipher::is_encrypted("ldap.example.com"));
        assert!(!SettingsCipher::is_encrypted("http://host:8095"));
    }
}
