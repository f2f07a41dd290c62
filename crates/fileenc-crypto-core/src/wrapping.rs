//! Password wrapping under a recovery key.
//!
//! This module provides:
//! - [`wrap_password`]: encrypt the user's password so the recovery phrase can recover it
//! - [`unwrap_password`]: recover the password from a wrapped blob
//!
//! # Key Hierarchy
//!
//! ```text
//! Password ──► PBKDF2(password, salt) ──► content key (encrypts the file)
//! Phrase ──► PBKDF2(phrase, fixed salt) ──► recovery key
//! Base64(recovery key) ──► PBKDF2(·, salt) ──► wrapping key ──► wraps Password
//! ```
//!
//! The recovery phrase never decrypts file content directly; it only
//! recovers the password, which then derives the content key as usual.
//!
//! Blob layout: `iv (16 bytes) || AES-256-CBC(UTF-8 password)`.

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::kdf::{self, DerivedKey};
use crate::symmetric::{self, BLOCK_LEN, IV_LEN};

/// Smallest well-formed wrapped blob: IV plus one cipher block.
pub const MIN_WRAPPED_LEN: usize = IV_LEN + BLOCK_LEN;

fn wrapping_key(recovery_key: &DerivedKey, salt: &[u8]) -> Result<DerivedKey, CryptoError> {
    let encoded = recovery_key.to_base64();
    kdf::derive_key(encoded.as_bytes(), salt)
}

/// Wrap `password` under `recovery_key`, bound to the container `salt`.
///
/// A fresh random IV is generated for every call, so wrapping the same
/// password twice yields different blobs.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if `salt` is empty.
pub fn wrap_password(
    password: &str,
    recovery_key: &DerivedKey,
    salt: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = wrapping_key(recovery_key, salt)?;
    let iv = symmetric::generate_iv();
    let ciphertext = symmetric::encrypt(password.as_bytes(), key.expose(), &iv)?;

    let mut blob = Vec::with_capacity(IV_LEN.saturating_add(ciphertext.len()));
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Recover the password wrapped by [`wrap_password`].
///
/// # Errors
///
/// Returns [`CryptoError::Unwrap`] for every failure after key derivation:
/// a malformed blob, bad padding (wrong recovery key), or a plaintext that
/// is not UTF-8. Callers should not be able to tell these apart.
pub fn unwrap_password(
    blob: &[u8],
    recovery_key: &DerivedKey,
    salt: &[u8],
) -> Result<Zeroizing<String>, CryptoError> {
    if blob.len() < MIN_WRAPPED_LEN || blob.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::Unwrap);
    }
    let key = wrapping_key(recovery_key, salt)?;

    let (iv_bytes, ciphertext) = blob.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);

    let plaintext =
        symmetric::decrypt(ciphertext, key.expose(), &iv).map_err(|_| CryptoError::Unwrap)?;
    let text = std::str::from_utf8(&plaintext).map_err(|_| CryptoError::Unwrap)?;
    Ok(Zeroizing::new(text.to_owned()))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
