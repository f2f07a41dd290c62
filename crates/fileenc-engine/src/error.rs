//! Engine error types for `fileenc-engine`.

use fileenc_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by container pipelines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input before any cryptography runs: empty password, malformed
    /// recovery phrase, invalid file name, missing private key.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Truncated header, bad length prefix or unknown layout.
    #[error("invalid container format: {0}")]
    Format(String),

    /// The input lacks the streaming certificate signature. The caller can
    /// retry with the legacy envelope decoder.
    #[error("not a streaming certificate container (legacy format)")]
    LegacyFormat,

    /// The container was encrypted for a different certificate.
    #[error("wrong certificate: file requires {expected}, got {actual}")]
    WrongCertificate {
        /// Thumbprint recorded in the container header.
        expected: String,
        /// Thumbprint of the certificate supplied by the caller.
        actual: String,
    },

    #[error("incorrect password or corrupted file")]
    IncorrectPassword,

    #[error("incorrect recovery phrase")]
    IncorrectRecoveryPhrase,

    #[error("incorrect certificate or corrupted file")]
    IncorrectCertificate,

    /// A recovery phrase was offered for a legacy container, which has none.
    #[error("this file was encrypted without a recovery phrase")]
    NoRecoveryPhrase,

    /// The operation observed a cancellation request. Not a failure.
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Format,
    /// Wrong secret, or corruption indistinguishable from one.
    Authentication,
    Cancelled,
    Io,
}

impl EngineError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) | Self::LegacyFormat | Self::NoRecoveryPhrase => ErrorKind::Format,
            Self::WrongCertificate { .. }
            | Self::IncorrectPassword
            | Self::IncorrectRecoveryPhrase
            | Self::IncorrectCertificate
            | Self::Crypto(CryptoError::Decryption | CryptoError::Unwrap) => {
                ErrorKind::Authentication
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
            Self::Validation(_) | Self::Config(_) | Self::Crypto(_) => ErrorKind::Validation,
        }
    }

    /// True for the cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
