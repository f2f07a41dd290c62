//! Password generation and strength scoring.
//!
//! - [`generate_random_password`]: character-based with configurable charsets
//! - [`strength::evaluate_strength`]: 0–100 score with a level and hints
//!
//! Generation uses `OsRng` for all randomness.

pub mod strength;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::CryptoError;

pub use strength::{evaluate_strength, PasswordStrength, StrengthLevel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum allowed generated password length.
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Maximum allowed generated password length.
pub const MAX_PASSWORD_LENGTH: usize = 32;

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

// Character sets
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
pub(crate) const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which character sets to include in a random password.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharsetConfig {
    /// Include uppercase letters (A-Z).
    pub uppercase: bool,
    /// Include lowercase letters (a-z).
    pub lowercase: bool,
    /// Include digits (0-9).
    pub digits: bool,
    /// Include symbols (!@#$%^&*...).
    pub symbols: bool,
}

impl Default for CharsetConfig {
    fn default() -> Self {
        Self {
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Generate a random password of `length` characters from the enabled charsets.
///
/// At least one character from each enabled charset is guaranteed. The
/// remaining positions are filled from the combined pool, then the whole
/// password is shuffled so the mandatory characters are not at the front.
///
/// # Errors
///
/// Returns [`CryptoError::PasswordGeneration`] if:
/// - `length` is outside [`MIN_PASSWORD_LENGTH`]..=[`MAX_PASSWORD_LENGTH`]
/// - No charset is enabled
pub fn generate_random_password(
    length: usize,
    charsets: &CharsetConfig,
) -> Result<String, CryptoError> {
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(CryptoError::PasswordGeneration(format!(
            "length must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH}, got {length}"
        )));
    }

    let mut pool: Vec<u8> = Vec::new();
    let mut chars: Vec<u8> = Vec::with_capacity(length);
    let mut rng = rand::rngs::OsRng;

    for (enabled, set) in [
        (charsets.uppercase, UPPERCASE),
        (charsets.lowercase, LOWERCASE),
        (charsets.digits, DIGITS),
        (charsets.symbols, SYMBOLS),
    ] {
        if enabled {
            pool.extend_from_slice(set);
            chars.push(set[rng.gen_range(0..set.len())]);
        }
    }

    if pool.is_empty() {
        return Err(CryptoError::PasswordGeneration(
            "at least one charset must be enabled".to_string(),
        ));
    }

    // At most four mandatory characters, and MIN_PASSWORD_LENGTH is four.
    while chars.len() < length {
        chars.push(pool[rng.gen_range(0..pool.len())]);
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars)
        .map_err(|_| CryptoError::PasswordGeneration("generated non-ASCII output".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_length_password() {
        let pw = generate_random_password(DEFAULT_PASSWORD_LENGTH, &CharsetConfig::default())
            .unwrap();
        assert_eq!(pw.len(), DEFAULT_PASSWORD_LENGTH);
    }

    #[test]
    fn bounds_accepted() {
        let charsets = CharsetConfig::default();
        assert_eq!(generate_random_password(4, &charsets).unwrap().len(), 4);
        assert_eq!(generate_random_password(32, &charsets).unwrap().len(), 32);
    }

    #[test]
    fn out_of_bounds_rejected() {
        let charsets = CharsetConfig::default();
        assert!(generate_random_password(3, &charsets).is_err());
        assert!(generate_random_password(33, &charsets).is_err());
    }

    #[test]
    fn no_charset_error() {
        let none = CharsetConfig {
            uppercase: false,
            lowercase: false,
            digits: false,
            symbols: false,
        };
        let err = generate_random_password(12, &none).unwrap_err();
        assert!(matches!(err, CryptoError::PasswordGeneration(_)));
    }

    #[test]
    fn contains_all_enabled_charsets() {
        for _ in 0..50 {
            let pw = generate_random_password(4, &CharsetConfig::default()).unwrap();
            assert!(pw.bytes().any(|c| UPPERCASE.contains(&c)), "{pw}");
            assert!(pw.bytes().any(|c| LOWERCASE.contains(&c)), "{pw}");
            assert!(pw.bytes().any(|c| DIGITS.contains(&c)), "{pw}");
            assert!(pw.bytes().any(|c| SYMBOLS.contains(&c)), "{pw}");
        }
    }

    #[test]
    fn digits_only() {
        let digits = CharsetConfig {
            uppercase: false,
            lowercase: false,
            digits: true,
            symbols: false,
        };
        let pw = generate_random_password(20, &digits).unwrap();
        assert!(pw.bytes().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn uniqueness_random() {
        let set: HashSet<String> = (0..20)
            .map(|_| generate_random_password(16, &CharsetConfig::default()).unwrap())
            .collect();
        assert_eq!(set.len(), 20);
    }
}
