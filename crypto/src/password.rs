use rand::{rngs::OsRng, Rng};

/// Generator for throwaway local passwords.
///
/// Accounts materialised from an external identity source get one of these
/// so the local password field is never blank and never derived from the
/// real external password.
pub struct PasswordGenerator;

impl PasswordGenerator {
    pub const ALPHABET_NUM: &'static str = "1234567890";
    pub const ALPHABET_SMALL: &'static str = "qwertyuiopasdfghjklzxcvbnm";
    pub const ALPHABET_BIG: &'static str = "QWERTYUIOPASDFGHJKLZXCVBNM";
    pub const ALPHABET_SPECIAL: &'static str = r#"`-=[]\;',./~!@#$%^&*()_+{}|:"<>?"#;

    /// Minimum length handed out regardless of the requested length.
    pub const MIN_LENGTH: usize = 16;

    pub fn full_alphabet() -> Vec<char> {
        [
            Self::ALPHABET_BIG,
            Self::ALPHABET_SMALL,
            Self::ALPHABET_NUM,
            Self::ALPHABET_SPECIAL,
        ]
        .concat()
        .chars()
        .collect()
    }

    pub fn generate(length: usize) -> String {
        Self::generate_from(length, &Self::full_alphabet())
    }

    pub fn generate_from(length: usize, alphabet: &[char]) -> String {
        if alphabet.is_empty() {
            return String::new();
        }
        let length = length.max(Self::MIN_LENGTH);
        (0..length)
            .filter_map(|_| alphabet.get(OsRng.gen_range(0..alphabet.len())).copied())
            .collect()
    }
}
