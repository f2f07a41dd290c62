//! Cryptographic error types for `fileenc-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (empty salt, zero iterations).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric or asymmetric encryption failure.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Ciphertext could not be decrypted: bad PKCS7 padding or a length that
    /// is not a whole number of blocks. Deliberately carries no detail.
    #[error("decryption failed")]
    Decryption,

    /// A wrapped secret could not be recovered with the supplied key.
    #[error("unwrap failed: wrong key or corrupted blob")]
    Unwrap,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Recovery phrase is malformed (word count, unknown word).
    #[error("recovery phrase error: {0}")]
    RecoveryPhrase(String),

    /// Certificate generation, parsing or RSA operation failure.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Password generation failure (invalid parameters).
    #[error("password generation error: {0}")]
    PasswordGeneration(String),
}
