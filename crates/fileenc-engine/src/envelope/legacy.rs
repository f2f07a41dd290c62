//! Whole-buffer certificate envelopes written by older releases.
//!
//! The envelope is Base64 text of
//! `string thumbprint | i32 + wrapped key | i32 + wrapped iv | i32 + AES-CBC(data)`,
//! little-endian. Files usually wrap it as `FILEENC_PKI_V1` followed by a
//! JSON document. These formats are read for compatibility; new files use
//! the streaming container.

use std::fs;
use std::path::{Path, PathBuf};

use data_encoding::BASE64;
use fileenc_crypto_core::symmetric::{self, IV_LEN, KEY_LEN};
use fileenc_crypto_core::Certificate;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{
    check_recipient, require_private_key, unwrap_exact, MAX_THUMBPRINT_LEN, MAX_WRAPPED_LEN,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::naming::{self, PendingOutput};
use crate::progress::Monitor;
use crate::wire;

/// Magic prefix of JSON-wrapped legacy files.
pub const WRAPPER_SIGNATURE: &[u8; 14] = b"FILEENC_PKI_V1";

/// Largest legacy file read into memory.
pub const MAX_LEGACY_FILE_LEN: u64 = 512 * 1024 * 1024;

/// Parsed envelope fields.
struct Envelope {
    thumbprint: String,
    wrapped_key: Vec<u8>,
    wrapped_iv: Vec<u8>,
    ciphertext: Vec<u8>,
}

fn malformed() -> EngineError {
    EngineError::Format("malformed legacy certificate envelope".into())
}

impl Envelope {
    fn parse(text: &str) -> Result<Self, EngineError> {
        let raw = BASE64.decode(text.trim().as_bytes()).map_err(|_| malformed())?;
        let mut r = raw.as_slice();
        let thumbprint = wire::read_string(&mut r, MAX_THUMBPRINT_LEN).map_err(|_| malformed())?;
        let wrapped_key = wire::read_blob(&mut r, MAX_WRAPPED_LEN).map_err(|_| malformed())?;
        let wrapped_iv = wire::read_blob(&mut r, MAX_WRAPPED_LEN).map_err(|_| malformed())?;
        let ciphertext = wire::read_blob(&mut r, raw.len()).map_err(|_| malformed())?;
        Ok(Self {
            thumbprint,
            wrapped_key,
            wrapped_iv,
            ciphertext,
        })
    }

    fn encode(&self) -> Result<String, EngineError> {
        let mut raw = Vec::new();
        wire::write_string(&mut raw, &self.thumbprint)?;
        wire::write_blob(&mut raw, &self.wrapped_key)?;
        wire::write_blob(&mut raw, &self.wrapped_iv)?;
        wire::write_blob(&mut raw, &self.ciphertext)?;
        Ok(BASE64.encode(&raw))
    }
}

/// Encrypt `data` for `certificate` as a Base64 envelope.
///
/// Kept so fixtures and interop tools can produce legacy envelopes.
///
/// # Errors
///
/// Returns [`EngineError::Crypto`] if RSA wrapping fails.
pub fn encrypt_buffer(data: &[u8], certificate: &Certificate) -> Result<String, EngineError> {
    let key = symmetric::generate_key();
    let iv = symmetric::generate_iv();
    Envelope {
        thumbprint: certificate.thumbprint().to_owned(),
        wrapped_key: certificate.wrap_key(key.as_slice())?,
        wrapped_iv: certificate.wrap_key(&iv)?,
        ciphertext: symmetric::encrypt(data, &key, &iv)?,
    }
    .encode()
}

/// Decrypt a Base64 envelope with `certificate`.
///
/// # Errors
///
/// - [`EngineError::Format`] for text that is not a valid envelope
/// - [`EngineError::WrongCertificate`] when the thumbprints differ
/// - [`EngineError::Validation`] if `certificate` has no private key
/// - [`EngineError::IncorrectCertificate`] when unwrapping or padding fails
pub fn decrypt_buffer(
    text: &str,
    certificate: &Certificate,
) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let envelope = Envelope::parse(text)?;
    check_recipient(&envelope.thumbprint, certificate)?;
    require_private_key(certificate)?;

    let key = unwrap_exact::<KEY_LEN>(certificate, &envelope.wrapped_key)?;
    let iv = unwrap_exact::<IV_LEN>(certificate, &envelope.wrapped_iv)?;
    symmetric::decrypt(&envelope.ciphertext, &key, &iv)
        .map_err(|_| EngineError::IncorrectCertificate)
}

/// JSON document behind [`WRAPPER_SIGNATURE`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyPkiFile {
    pub original_file_name: String,
    /// Base64 envelope, see [`decrypt_buffer`].
    pub encrypted_content: String,
    pub certificate_thumbprint: String,
    /// Kept verbatim; old writers used local time without an offset.
    #[serde(default)]
    pub encrypted_date: String,
}

impl LegacyPkiFile {
    /// Encrypt `data` for `certificate` into a wrapped legacy document.
    ///
    /// # Errors
    ///
    /// As [`encrypt_buffer`].
    pub fn seal(
        original_file_name: &str,
        data: &[u8],
        certificate: &Certificate,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            original_file_name: original_file_name.to_owned(),
            encrypted_content: encrypt_buffer(data, certificate)?,
            certificate_thumbprint: certificate.thumbprint().to_owned(),
            encrypted_date: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        })
    }

    /// `FILEENC_PKI_V1` followed by the JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
        let json = serde_json::to_vec(self).map_err(|e| EngineError::Format(e.to_string()))?;
        let mut out = WRAPPER_SIGNATURE.to_vec();
        out.extend_from_slice(&json);
        Ok(out)
    }

    /// Parse bytes produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] without the signature or for invalid JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let json = bytes
            .strip_prefix(WRAPPER_SIGNATURE.as_slice())
            .ok_or_else(|| EngineError::Format("missing FILEENC_PKI_V1 signature".into()))?;
        serde_json::from_slice(json)
            .map_err(|e| EngineError::Format(format!("invalid legacy document: {e}")))
    }
}

/// Recipient thumbprint of a legacy file's contents.
///
/// # Errors
///
/// Returns [`EngineError::Format`] for unrecognized contents.
pub fn thumbprint_of_file(bytes: &[u8]) -> Result<String, EngineError> {
    if bytes.starts_with(WRAPPER_SIGNATURE) {
        return Ok(LegacyPkiFile::from_bytes(bytes)?.certificate_thumbprint);
    }
    let text = std::str::from_utf8(bytes).map_err(|_| malformed())?;
    Ok(Envelope::parse(text)?.thumbprint)
}

/// Legacy files are read whole, so refuse anything over
/// [`MAX_LEGACY_FILE_LEN`] before reading.
pub(crate) fn check_file_size(input_path: &Path) -> Result<(), EngineError> {
    if fs::metadata(input_path)?.len() > MAX_LEGACY_FILE_LEN {
        return Err(EngineError::Format("legacy certificate file is too large".into()));
    }
    Ok(())
}

/// Decrypt a legacy file: a `FILEENC_PKI_V1` document, or a bare Base64
/// envelope named after the input file's stem.
///
/// The whole file is processed in memory; progress jumps to 100 once the
/// plaintext is written.
///
/// # Errors
///
/// As [`decrypt_buffer`], plus [`EngineError::Validation`] for an unsafe
/// stored name and [`EngineError::Io`].
pub fn decrypt_legacy_file(
    input_path: &Path,
    output_dir: &Path,
    certificate: &Certificate,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    config.validate()?;
    monitor.check_cancelled()?;
    check_file_size(input_path)?;
    let bytes = fs::read(input_path)?;

    let (file_name, plaintext) = if bytes.starts_with(WRAPPER_SIGNATURE) {
        let document = LegacyPkiFile::from_bytes(&bytes)?;
        check_recipient(&document.certificate_thumbprint, certificate)?;
        let plaintext = decrypt_buffer(&document.encrypted_content, certificate)?;
        (document.original_file_name, plaintext)
    } else {
        let text = std::str::from_utf8(&bytes).map_err(|_| malformed())?;
        let plaintext = decrypt_buffer(text, certificate)?;
        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EngineError::Validation("input has no usable file name".into()))?;
        (stem.to_owned(), plaintext)
    };
    naming::validate_file_name(&file_name)?;
    monitor.check_cancelled()?;

    let mut pending = PendingOutput::create_unique(output_dir, &file_name)?;
    std::io::Write::write_all(&mut pending, &plaintext)?;
    let path = pending.commit()?;
    monitor.report(100.0);
    tracing::info!(file = %file_name, path = %path.display(), "legacy certificate file decrypted");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_format_error() {
        assert!(matches!(
            Envelope::parse("not base64 at all!"),
            Err(EngineError::Format(_))
        ));
        // Valid Base64, truncated framing.
        assert!(matches!(
            Envelope::parse(&BASE64.encode(&[0x05, b'A'])),
            Err(EngineError::Format(_))
        ));
    }

    #[test]
    fn envelope_framing_roundtrip() {
        let envelope = Envelope {
            thumbprint: "0A1B".into(),
            wrapped_key: vec![1; 8],
            wrapped_iv: vec![2; 8],
            ciphertext: vec![3; 32],
        };
        let text = envelope.encode().unwrap();
        let parsed = Envelope::parse(&text).unwrap();
        assert_eq!(parsed.thumbprint, "0A1B");
        assert_eq!(parsed.ciphertext, vec![3; 32]);

        // Lengths are little-endian i32s after the 7-bit thumbprint string.
        let raw = BASE64.decode(text.as_bytes()).unwrap();
        assert_eq!(&raw[..5], &[4, b'0', b'A', b'1', b'B']);
        assert_eq!(&raw[5..9], &8i32.to_le_bytes());
    }

    #[test]
    fn document_json_uses_pascal_case() {
        let doc = LegacyPkiFile {
            original_file_name: "a.txt".into(),
            encrypted_content: "QQ==".into(),
            certificate_thumbprint: "AB".into(),
            encrypted_date: "2024-03-01T10:00:00".into(),
        };
        let bytes = doc.to_bytes().unwrap();
        assert!(bytes.starts_with(WRAPPER_SIGNATURE));
        let json = std::str::from_utf8(&bytes[WRAPPER_SIGNATURE.len()..]).unwrap();
        assert!(json.contains("\"OriginalFileName\":\"a.txt\""));
        assert!(json.contains("\"CertificateThumbprint\""));
        assert_eq!(LegacyPkiFile::from_bytes(&bytes).unwrap(), doc);
    }

    #[test]
    fn document_without_date_still_parses() {
        let mut bytes = WRAPPER_SIGNATURE.to_vec();
        bytes.extend_from_slice(
            br#"{"OriginalFileName":"x","EncryptedContent":"","CertificateThumbprint":"AB"}"#,
        );
        let doc = LegacyPkiFile::from_bytes(&bytes).unwrap();
        assert!(doc.encrypted_date.is_empty());
        assert_eq!(thumbprint_of_file(&bytes).unwrap(), "AB");
    }
}
