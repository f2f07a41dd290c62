//! PBKDF2-HMAC-SHA256 key derivation.
//!
//! Every key in a FileEncrypter container comes from [`derive_key`]: the
//! content key (password + container salt), the recovery key (phrase +
//! fixed salt) and the password-wrapping key (Base64 recovery key +
//! container salt). The iteration count is part of the on-disk format and
//! must never change.

use std::fmt;
use std::num::NonZeroU32;

use data_encoding::BASE64;
use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Output length of the KDF in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// PBKDF2 iteration count used by every container version.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Random salt length written into symmetric containers.
pub const SALT_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A 256-bit derived key, zeroized on drop.
///
/// `Debug` output is masked so keys never end up in logs.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    #[must_use]
    pub const fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Standard Base64 encoding of the key.
    ///
    /// The recovery key is fed back into [`derive_key`] in this textual form
    /// when wrapping the user's password, so the exact alphabet and padding
    /// matter for compatibility.
    #[must_use]
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(&self.0))
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from `secret` and `salt` with PBKDF2-HMAC-SHA256
/// and [`PBKDF2_ITERATIONS`] rounds.
///
/// Pure and deterministic. Any secret length is accepted, including empty;
/// callers enforce password policy before reaching this function.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if `salt` is empty.
pub fn derive_key(secret: &[u8], salt: &[u8]) -> Result<DerivedKey, CryptoError> {
    derive_key_with_iterations(secret, salt, PBKDF2_ITERATIONS)
}

/// [`derive_key`] with an explicit iteration count.
///
/// Only exposed so tests can check the primitive against published
/// PBKDF2 vectors without paying for 100k rounds.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if `salt` is empty or
/// `iterations` is zero.
pub fn derive_key_with_iterations(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<DerivedKey, CryptoError> {
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivation("salt must not be empty".into()));
    }
    let rounds = NonZeroU32::new(iterations)
        .ok_or_else(|| CryptoError::KeyDerivation("iteration count must be non-zero".into()))?;

    let mut output = [0u8; KEY_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, rounds, salt, secret, &mut output);
    let key = DerivedKey(output);
    output.zeroize();
    Ok(key)
}

/// Generate a fresh random container salt from the OS CSPRNG.
#[must_use]
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;

    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::HEXLOWER;

    #[test]
    fn rfc7914_pbkdf2_sha256_vector() {
        // RFC 7914 section 11: P="passwd", S="salt", c=1, dkLen=64 (first 32 bytes).
        let key = derive_key_with_iterations(b"passwd", b"salt", 1).unwrap();
        assert_eq!(
            HEXLOWER.encode(key.expose()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let a = derive_key(b"Tr0ub4dor&3", &[7u8; SALT_LEN]).unwrap();
        let b = derive_key(b"Tr0ub4dor&3", &[7u8; SALT_LEN]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_changes_output() {
        let a = derive_key(b"password", &[1u8; SALT_LEN]).unwrap();
        let b = derive_key(b"password", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_salt_rejected() {
        let err = derive_key(b"password", &[]).unwrap_err();
        assert!(matches!(err, CryptoError::KeyDerivation(_)));
    }

    #[test]
    fn zero_iterations_rejected() {
        let err = derive_key_with_iterations(b"password", b"salt", 0).unwrap_err();
        assert!(matches!(err, CryptoError::KeyDerivation(_)));
    }

    #[test]
    fn debug_is_masked() {
        let key = DerivedKey::from_bytes([0xAB; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "DerivedKey(***)");
    }

    #[test]
    fn base64_is_padded_standard_alphabet() {
        let key = DerivedKey::from_bytes([0xFF; KEY_LEN]);
        let encoded = key.to_base64();
        assert_eq!(encoded.len(), 44);
        assert!(encoded.ends_with('='));
    }

    #[test]
    fn generated_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
