//! RSA certificates for hybrid (RSA-OAEP + AES) file encryption.
//!
//! A [`Certificate`] is an RSA keypair (private half optional) plus the
//! metadata a user picks certificates by: subject, issuer, validity window
//! and a friendly name. The thumbprint is the upper-case hex SHA-1 of the
//! DER `SubjectPublicKeyInfo`, so it identifies the key regardless of how
//! the metadata is stored.
//!
//! Key material only ever wraps AES keys and IVs with RSA-OAEP-SHA256.

use std::fmt;

use chrono::{DateTime, Duration, Months, Utc};
use data_encoding::HEXUPPER;
use rand::rngs::OsRng;
use ring::digest;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// RSA modulus sizes accepted by [`Certificate::generate_self_signed`].
pub const ALLOWED_KEY_BITS: [usize; 3] = [2048, 3072, 4096];

/// Default RSA modulus size for new certificates.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Longest validity accepted for a self-signed certificate.
pub const MAX_VALIDITY_YEARS: u32 = 30;

/// Default validity for a self-signed certificate.
pub const DEFAULT_VALIDITY_YEARS: u32 = 5;

/// Used by [`Certificate::common_name`] when the subject has no `CN=` part.
const UNNAMED: &str = "Unnamed certificate";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Public description of a certificate, safe to list and log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    /// Distinguished name of the subject, e.g. `CN=Alice`.
    pub subject: String,
    /// Distinguished name of the issuer (equal to `subject` when self-signed).
    pub issuer: String,
    /// Upper-case hex SHA-1 of the public key DER.
    pub thumbprint: String,
    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,
    /// End of the validity window.
    pub valid_to: DateTime<Utc>,
    /// Whether the private key is available (needed to decrypt).
    pub has_private_key: bool,
    /// Label shown to users.
    pub friendly_name: String,
}

/// RSA keypair plus metadata.
#[derive(Clone)]
pub struct Certificate {
    info: CertificateInfo,
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("info", &self.info)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// On-disk JSON form produced by [`Certificate::export_json`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCertificate {
    subject: String,
    issuer: String,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    friendly_name: String,
    public_key_pem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_key_pem: Option<String>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Compute the thumbprint of an RSA public key.
///
/// # Errors
///
/// Returns [`CryptoError::Certificate`] if the key cannot be DER-encoded.
pub fn thumbprint_of(public_key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = public_key
        .to_public_key_der()
        .map_err(|e| CryptoError::Certificate(format!("public key encoding failed: {e}")))?;
    let hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, der.as_bytes());
    Ok(HEXUPPER.encode(hash.as_ref()))
}

impl Certificate {
    /// Assemble a certificate from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Certificate`] if the subject is blank, the
    /// validity window is inverted, or `private_key` does not belong to
    /// `public_key`.
    pub fn new(
        subject: &str,
        issuer: &str,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        friendly_name: &str,
        public_key: RsaPublicKey,
        private_key: Option<RsaPrivateKey>,
    ) -> Result<Self, CryptoError> {
        if subject.trim().is_empty() {
            return Err(CryptoError::Certificate("subject must not be empty".into()));
        }
        if valid_to < valid_from {
            return Err(CryptoError::Certificate(
                "validity window ends before it starts".into(),
            ));
        }
        if let Some(private) = &private_key {
            if RsaPublicKey::from(private) != public_key {
                return Err(CryptoError::Certificate(
                    "private key does not match public key".into(),
                ));
            }
        }

        let info = CertificateInfo {
            subject: subject.trim().to_owned(),
            issuer: issuer.trim().to_owned(),
            thumbprint: thumbprint_of(&public_key)?,
            valid_from,
            valid_to,
            has_private_key: private_key.is_some(),
            friendly_name: friendly_name.to_owned(),
        };
        Ok(Self {
            info,
            public_key,
            private_key,
        })
    }

    /// Generate a new RSA keypair and wrap it as a self-signed certificate.
    ///
    /// The validity window starts one day in the past to absorb clock skew.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Certificate`] if `key_bits` is not one of
    /// [`ALLOWED_KEY_BITS`], `validity_years` is outside
    /// `1..=MAX_VALIDITY_YEARS`, the subject is blank, or key generation fails.
    pub fn generate_self_signed(
        subject: &str,
        key_bits: usize,
        validity_years: u32,
    ) -> Result<Self, CryptoError> {
        if subject.trim().is_empty() {
            return Err(CryptoError::Certificate("subject must not be empty".into()));
        }
        if !ALLOWED_KEY_BITS.contains(&key_bits) {
            return Err(CryptoError::Certificate(format!(
                "key size must be one of {ALLOWED_KEY_BITS:?}, got {key_bits}"
            )));
        }
        check_validity_years(validity_years)?;
        let private_key = RsaPrivateKey::new(&mut OsRng, key_bits)
            .map_err(|e| CryptoError::Certificate(format!("RSA key generation failed: {e}")))?;
        Self::from_private_key(subject, private_key, validity_years)
    }

    /// Wrap an existing RSA private key as a self-signed certificate.
    ///
    /// # Errors
    ///
    /// Same validity and subject checks as [`Certificate::generate_self_signed`].
    pub fn from_private_key(
        subject: &str,
        private_key: RsaPrivateKey,
        validity_years: u32,
    ) -> Result<Self, CryptoError> {
        check_validity_years(validity_years)?;
        let now = Utc::now();
        let valid_from = now
            .checked_sub_signed(Duration::days(1))
            .ok_or_else(|| CryptoError::Certificate("validity start out of range".into()))?;
        let valid_to = valid_from
            .checked_add_months(Months::new(validity_years.saturating_mul(12)))
            .ok_or_else(|| CryptoError::Certificate("validity end out of range".into()))?;
        let friendly_name = format!("File encryption certificate - {}", now.format("%Y-%m-%d"));

        let public_key = RsaPublicKey::from(&private_key);
        Self::new(
            subject,
            subject,
            valid_from,
            valid_to,
            &friendly_name,
            public_key,
            Some(private_key),
        )
    }

    /// Copy of this certificate without the private key.
    #[must_use]
    pub fn public_only(&self) -> Self {
        let mut info = self.info.clone();
        info.has_private_key = false;
        Self {
            info,
            public_key: self.public_key.clone(),
            private_key: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Listing metadata.
    #[must_use]
    pub const fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// Upper-case hex thumbprint.
    #[must_use]
    pub fn thumbprint(&self) -> &str {
        &self.info.thumbprint
    }

    /// Whether this certificate can decrypt.
    #[must_use]
    pub const fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// RSA public key.
    #[must_use]
    pub const fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// RSA modulus size in bits.
    #[must_use]
    pub fn key_bits(&self) -> usize {
        self.public_key.size().saturating_mul(8)
    }

    /// Whether `other` (as stored in a file header) names this certificate.
    /// Comparison ignores ASCII case.
    #[must_use]
    pub fn matches_thumbprint(&self, other: &str) -> bool {
        self.info.thumbprint.eq_ignore_ascii_case(other.trim())
    }

    /// The `CN=` component of the subject, or a placeholder.
    #[must_use]
    pub fn common_name(&self) -> String {
        common_name_of(&self.info.subject)
    }

    /// Whether `at` falls inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.info.valid_from <= at && at <= self.info.valid_to
    }

    /// Whether this certificate may be used to encrypt right now.
    #[must_use]
    pub fn is_valid_for_encryption(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    // -----------------------------------------------------------------------
    // RSA-OAEP
    // -----------------------------------------------------------------------

    /// Encrypt a short secret (AES key or IV) with RSA-OAEP-SHA256.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the message is too long for
    /// the modulus.
    pub fn wrap_key(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), secret)
            .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP encryption failed: {e}")))
    }

    /// Decrypt a blob produced by [`Certificate::wrap_key`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Certificate`] if there is no private key and
    /// [`CryptoError::Decryption`] if OAEP decoding fails.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let private = self
            .private_key
            .as_ref()
            .ok_or_else(|| CryptoError::Certificate("certificate has no private key".into()))?;
        private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Decryption)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize to JSON with PEM-encoded keys.
    ///
    /// The private key is included only when `include_private` is set and
    /// the certificate has one.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Certificate`] if PEM or JSON encoding fails.
    pub fn export_json(&self, include_private: bool) -> Result<Zeroizing<String>, CryptoError> {
        let public_key_pem = self
            .public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Certificate(format!("public key PEM encoding failed: {e}")))?;
        let private_key_pem = match (&self.private_key, include_private) {
            (Some(private), true) => Some(
                private
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| {
                        CryptoError::Certificate(format!("private key PEM encoding failed: {e}"))
                    })?
                    .to_string(),
            ),
            _ => None,
        };

        let stored = StoredCertificate {
            subject: self.info.subject.clone(),
            issuer: self.info.issuer.clone(),
            valid_from: self.info.valid_from,
            valid_to: self.info.valid_to,
            friendly_name: self.info.friendly_name.clone(),
            public_key_pem,
            private_key_pem,
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| CryptoError::Certificate(format!("serialization failed: {e}")));
        drop(Zeroizing::new(stored.private_key_pem));
        json.map(Zeroizing::new)
    }

    /// Parse JSON produced by [`Certificate::export_json`].
    ///
    /// The thumbprint is recomputed from the public key, never trusted
    /// from the file.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Certificate`] on malformed JSON or PEM, or a
    /// private key that does not match the public key.
    pub fn import_json(json: &str) -> Result<Self, CryptoError> {
        let mut stored: StoredCertificate = serde_json::from_str(json)
            .map_err(|e| CryptoError::Certificate(format!("invalid certificate file: {e}")))?;
        let public_key = RsaPublicKey::from_public_key_pem(&stored.public_key_pem)
            .map_err(|e| CryptoError::Certificate(format!("invalid public key PEM: {e}")))?;
        let private_pem = stored.private_key_pem.take().map(Zeroizing::new);
        let private_key = private_pem
            .as_ref()
            .map(|pem| {
                RsaPrivateKey::from_pkcs8_pem(pem.as_str())
                    .map_err(|e| CryptoError::Certificate(format!("invalid private key PEM: {e}")))
            })
            .transpose()?;

        Self::new(
            &stored.subject,
            &stored.issuer,
            stored.valid_from,
            stored.valid_to,
            &stored.friendly_name,
            public_key,
            private_key,
        )
    }
}

fn check_validity_years(years: u32) -> Result<(), CryptoError> {
    if (1..=MAX_VALIDITY_YEARS).contains(&years) {
        Ok(())
    } else {
        Err(CryptoError::Certificate(format!(
            "validity must be between 1 and {MAX_VALIDITY_YEARS} years, got {years}"
        )))
    }
}

/// Extract the `CN=` value from a distinguished name.
#[must_use]
pub fn common_name_of(subject: &str) -> String {
    subject
        .split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("CN="))
        .map(str::trim)
        .filter(|cn| !cn.is_empty())
        .map_or_else(|| UNNAMED.to_owned(), str::to_owned)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
