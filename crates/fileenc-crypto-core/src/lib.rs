//! `fileenc-crypto-core`: cryptographic primitives for FileEncrypter containers.
//!
//! Pure functions over byte slices and `Read`/`Write` adapters: no file
//! system access, no logging, no global state beyond the embedded word list.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

pub mod kdf;
pub mod symmetric;

pub mod recovery;
pub mod wrapping;

pub mod certificate;

pub mod password;

pub use certificate::{thumbprint_of, Certificate, CertificateInfo};
pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, DerivedKey, KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};
pub use password::{
    evaluate_strength, generate_random_password, CharsetConfig, PasswordStrength, StrengthLevel,
    DEFAULT_PASSWORD_LENGTH,
};
pub use recovery::{
    derive_key_from_phrase, format_for_display, phrase_words, suggest_words, validate,
    RecoveryPhrase, PHRASE_WORD_COUNT, RECOVERY_SALT,
};
pub use symmetric::{CbcReader, CbcWriter, BLOCK_LEN, IV_LEN};
pub use wrapping::{unwrap_password, wrap_password};
