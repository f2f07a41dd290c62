//! Certificate envelopes: a random AES-256 key and IV, each wrapped with
//! RSA-OAEP-SHA256 for one certificate, protecting the file with AES-CBC.
//!
//! Streaming layout (`FILEENC_PKI_V2`):
//!
//! ```text
//! [signature:14][i32 header_len][header][AES-CBC(content)]
//! header = string name | i64 size | string thumbprint | i64 ticks
//!        | i32 len + wrapped key | i32 len + wrapped iv
//! ```
//!
//! Older files are handled by [`legacy`]. [`detect_format`] picks the
//! decoder from the leading bytes.

pub mod legacy;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fileenc_crypto_core::symmetric::{self, CbcReader, CbcWriter, IV_LEN, KEY_LEN};
use fileenc_crypto_core::Certificate;

use crate::certificates::CertificateProvider;
use crate::config::EngineConfig;
use crate::container::{remove_source, source_file_name, write_output};
use crate::error::EngineError;
use crate::naming::{self, PendingOutput, MAX_FILE_NAME_LEN};
use crate::progress::{pump, Monitor, Tracker};
use crate::wire;

/// Magic prefix of streaming certificate containers.
pub const SIGNATURE: &[u8; 14] = b"FILEENC_PKI_V2";

/// Upper bound on the encoded header.
pub const MAX_HEADER_LEN: usize = 1024 * 1024;

/// Longest thumbprint accepted from a header.
pub(crate) const MAX_THUMBPRINT_LEN: usize = 128;

/// RSA-4096 produces 512-byte ciphertexts.
pub(crate) const MAX_WRAPPED_LEN: usize = 1024;

/// .NET ticks (100 ns units since 0001-01-01) at the Unix epoch.
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

// ── Format detection ───────────────────────────────────────────────

/// Certificate container flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkiFormat {
    /// `FILEENC_PKI_V2` streaming container.
    StreamingV2,
    /// `FILEENC_PKI_V1` followed by a JSON document.
    LegacyWrapped,
    /// Anything else: a bare Base64 envelope.
    LegacyEnvelope,
}

/// Classify a certificate container by its first bytes.
#[must_use]
pub fn detect_format(prefix: &[u8]) -> PkiFormat {
    if prefix.starts_with(SIGNATURE) {
        PkiFormat::StreamingV2
    } else if prefix.starts_with(legacy::WRAPPER_SIGNATURE) {
        PkiFormat::LegacyWrapped
    } else {
        PkiFormat::LegacyEnvelope
    }
}

// ── Header ─────────────────────────────────────────────────────────

/// Clear-text header of a streaming container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub file_name: String,
    pub original_size: u64,
    /// Uppercase hex thumbprint of the recipient certificate.
    pub thumbprint: String,
    pub encrypted_at: DateTime<Utc>,
    pub wrapped_key: Vec<u8>,
    pub wrapped_iv: Vec<u8>,
}

#[allow(clippy::arithmetic_side_effects)]
fn to_ticks(at: DateTime<Utc>) -> Result<i64, EngineError> {
    at.timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(i64::from(at.timestamp_subsec_nanos() / 100)))
        .and_then(|t| t.checked_add(TICKS_AT_UNIX_EPOCH))
        .ok_or_else(|| EngineError::Validation("timestamp out of range".into()))
}

#[allow(clippy::arithmetic_side_effects)]
fn from_ticks(ticks: i64) -> Result<DateTime<Utc>, EngineError> {
    let since_epoch = ticks
        .checked_sub(TICKS_AT_UNIX_EPOCH)
        .ok_or_else(|| EngineError::Format("timestamp out of range".into()))?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_epoch.rem_euclid(TICKS_PER_SECOND) * 100)
        .map_err(|_| EngineError::Format("timestamp out of range".into()))?;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| EngineError::Format("timestamp out of range".into()))
}

impl EnvelopeHeader {
    /// Serialize the header body (without signature or length prefix).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for sizes or dates the format
    /// cannot represent.
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        let size = i64::try_from(self.original_size)
            .map_err(|_| EngineError::Validation("input is too large".into()))?;
        let mut out = Vec::new();
        wire::write_string(&mut out, &self.file_name)?;
        wire::write_i64(&mut out, size)?;
        wire::write_string(&mut out, &self.thumbprint)?;
        wire::write_i64(&mut out, to_ticks(self.encrypted_at)?)?;
        wire::write_blob(&mut out, &self.wrapped_key)?;
        wire::write_blob(&mut out, &self.wrapped_iv)?;
        Ok(out)
    }

    /// Parse a header body produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] for truncated or out-of-range fields.
    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut r = bytes;
        let file_name = wire::read_string(&mut r, MAX_FILE_NAME_LEN).map_err(header_error)?;
        let size = wire::read_i64(&mut r).map_err(header_error)?;
        let original_size = u64::try_from(size)
            .map_err(|_| EngineError::Format("negative original size".into()))?;
        let thumbprint = wire::read_string(&mut r, MAX_THUMBPRINT_LEN).map_err(header_error)?;
        let encrypted_at = from_ticks(wire::read_i64(&mut r).map_err(header_error)?)?;
        let wrapped_key = wire::read_blob(&mut r, MAX_WRAPPED_LEN).map_err(header_error)?;
        let wrapped_iv = wire::read_blob(&mut r, MAX_WRAPPED_LEN).map_err(header_error)?;
        if !r.is_empty() {
            return Err(EngineError::Format("trailing bytes after header".into()));
        }
        Ok(Self {
            file_name,
            original_size,
            thumbprint,
            encrypted_at,
            wrapped_key,
            wrapped_iv,
        })
    }
}

fn header_error(e: io::Error) -> EngineError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => EngineError::Format("header is truncated".into()),
        io::ErrorKind::InvalidData => EngineError::Format(format!("invalid header: {e}")),
        _ => EngineError::Io(e),
    }
}

/// Read and parse the header of a streaming container, leaving `reader`
/// at the start of the ciphertext. Needs no private key.
///
/// # Errors
///
/// - [`EngineError::LegacyFormat`] if the signature is missing
/// - [`EngineError::Format`] for a bad length or malformed header
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<EnvelopeHeader, EngineError> {
    let prefix = wire::read_prefix(reader, SIGNATURE.len())?;
    if prefix.as_slice() != SIGNATURE {
        return Err(EngineError::LegacyFormat);
    }
    let len = wire::read_i32(reader).map_err(header_error)?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| (1..=MAX_HEADER_LEN).contains(len))
        .ok_or_else(|| EngineError::Format(format!("header length {len} out of range")))?;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).map_err(header_error)?;
    EnvelopeHeader::decode(&bytes)
}

// ── Encrypt ────────────────────────────────────────────────────────

/// Encrypt `input_len` bytes from `input` for `certificate`, writing a
/// streaming container to `output`. Returns the header that was written.
///
/// Only the public key is used. Content is not compressed.
///
/// # Errors
///
/// - [`EngineError::Validation`] for an unsafe `file_name`, a certificate
///   outside its validity period, or input whose length differs from
///   `input_len`
/// - [`EngineError::Crypto`] if RSA wrapping fails
/// - [`EngineError::Cancelled`], [`EngineError::Config`], [`EngineError::Io`]
pub fn encrypt_stream<R: Read, W: Write>(
    mut input: R,
    input_len: u64,
    file_name: &str,
    mut output: W,
    certificate: &Certificate,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<EnvelopeHeader, EngineError> {
    config.validate()?;
    naming::validate_file_name(file_name)?;
    if !certificate.is_valid_for_encryption() {
        return Err(EngineError::Validation(format!(
            "certificate {} is expired or not yet valid",
            certificate.thumbprint()
        )));
    }
    monitor.check_cancelled()?;

    let key = symmetric::generate_key();
    let iv = symmetric::generate_iv();
    let header = EnvelopeHeader {
        file_name: file_name.to_owned(),
        original_size: input_len,
        thumbprint: certificate.thumbprint().to_owned(),
        encrypted_at: Utc::now(),
        wrapped_key: certificate.wrap_key(key.as_slice())?,
        wrapped_iv: certificate.wrap_key(&iv)?,
    };
    let encoded = header.encode()?;

    output.write_all(SIGNATURE)?;
    wire::write_blob(&mut output, &encoded)?;
    tracing::debug!(file = file_name, thumbprint = %header.thumbprint, "envelope header written");

    let mut cipher = CbcWriter::new(output, &key, &iv);
    let mut tracker = Tracker::new(monitor, input_len);
    let read = pump(
        &mut input,
        &mut cipher,
        config.chunk_size,
        &mut tracker,
        EngineError::Io,
    )?;
    if read != input_len {
        return Err(EngineError::Validation(format!(
            "input changed size while reading: expected {input_len} bytes, read {read}"
        )));
    }
    let mut output = cipher.finish()?;
    output.flush()?;

    tracker.finish();
    tracing::info!(file = file_name, bytes = input_len, "file encrypted for certificate");
    Ok(header)
}

/// Encrypt the file at `input_path` for `certificate` into a new file at
/// `output_path`, which is removed again on failure or cancellation.
///
/// # Errors
///
/// As [`encrypt_stream`], plus [`EngineError::Io`] if `output_path` exists.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    certificate: &Certificate,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<EnvelopeHeader, EngineError> {
    let file_name = source_file_name(input_path)?;
    let input = File::open(input_path)?;
    let input_len = input.metadata()?.len();

    let mut pending = PendingOutput::create(output_path)?;
    let header = encrypt_stream(
        BufReader::new(input),
        input_len,
        file_name,
        BufWriter::new(&mut pending),
        certificate,
        config,
        monitor,
    )?;
    pending.commit()?;
    Ok(header)
}

// ── Decrypt ────────────────────────────────────────────────────────

const fn wrong_certificate() -> EngineError {
    EngineError::IncorrectCertificate
}

/// Fail unless `certificate` is the recipient named in the container.
pub(crate) fn check_recipient(
    thumbprint: &str,
    certificate: &Certificate,
) -> Result<(), EngineError> {
    if certificate.matches_thumbprint(thumbprint) {
        Ok(())
    } else {
        Err(EngineError::WrongCertificate {
            expected: thumbprint.to_owned(),
            actual: certificate.thumbprint().to_owned(),
        })
    }
}

pub(crate) fn require_private_key(certificate: &Certificate) -> Result<(), EngineError> {
    if certificate.has_private_key() {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "certificate {} has no private key",
            certificate.thumbprint()
        )))
    }
}

/// Unwrap a key or IV of exactly `N` bytes.
pub(crate) fn unwrap_exact<const N: usize>(
    certificate: &Certificate,
    wrapped: &[u8],
) -> Result<zeroize::Zeroizing<[u8; N]>, EngineError> {
    let plain = certificate
        .unwrap_key(wrapped)
        .map_err(|_| EngineError::IncorrectCertificate)?;
    let mut out = zeroize::Zeroizing::new([0u8; N]);
    if plain.len() != N {
        return Err(EngineError::IncorrectCertificate);
    }
    out.copy_from_slice(&plain);
    Ok(out)
}

/// Decrypt a streaming container from `input` into a new file in
/// `output_dir`, returning its path.
///
/// Checks run in order: signature, header, recipient thumbprint, private
/// key, RSA unwrap. The output file is only created once all pass.
///
/// # Errors
///
/// - [`EngineError::LegacyFormat`] without the streaming signature
/// - [`EngineError::Format`] for a malformed header or length mismatch
/// - [`EngineError::WrongCertificate`] when the thumbprints differ
/// - [`EngineError::Validation`] for a certificate without private key or
///   an unsafe stored file name
/// - [`EngineError::IncorrectCertificate`] when unwrapping or padding fails
/// - [`EngineError::Cancelled`], [`EngineError::Io`]
pub fn decrypt_stream<R: Read>(
    mut input: R,
    output_dir: &Path,
    certificate: &Certificate,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    config.validate()?;
    let header = read_header(&mut input)?;
    tracing::debug!(
        file = %header.file_name,
        thumbprint = %header.thumbprint,
        "envelope header parsed"
    );

    check_recipient(&header.thumbprint, certificate)?;
    require_private_key(certificate)?;
    naming::validate_file_name(&header.file_name)?;

    let key = unwrap_exact::<KEY_LEN>(certificate, &header.wrapped_key)?;
    let iv = unwrap_exact::<IV_LEN>(certificate, &header.wrapped_iv)?;

    let mut cipher = CbcReader::new(input, &key, &iv);
    let written = write_output(
        &mut cipher,
        output_dir,
        &header.file_name,
        header.original_size,
        config,
        monitor,
        wrong_certificate,
    )?;
    written.finish(&header.file_name, header.original_size)
}

/// Decrypt any certificate container at `input_path`, choosing the decoder
/// with [`detect_format`].
///
/// The container is deleted afterwards only when
/// [`EngineConfig::delete_source`] is set.
///
/// # Errors
///
/// As [`decrypt_stream`] or [`legacy::decrypt_legacy_file`].
pub fn decrypt_file(
    input_path: &Path,
    output_dir: &Path,
    certificate: &Certificate,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    let mut input = BufReader::new(File::open(input_path)?);
    let prefix = wire::read_prefix(&mut input, SIGNATURE.len())?;

    let output = match detect_format(&prefix) {
        PkiFormat::StreamingV2 => {
            let input = Cursor::new(prefix).chain(input);
            decrypt_stream(input, output_dir, certificate, config, monitor)?
        }
        format => {
            drop(input);
            tracing::debug!(?format, "legacy certificate container");
            legacy::decrypt_legacy_file(input_path, output_dir, certificate, config, monitor)?
        }
    };
    if config.delete_source {
        remove_source(input_path);
    }
    Ok(output)
}

/// Recipient thumbprint of any certificate container, without decrypting.
///
/// # Errors
///
/// Returns [`EngineError::Format`] if no thumbprint can be read or a legacy
/// file exceeds [`legacy::MAX_LEGACY_FILE_LEN`].
pub fn peek_thumbprint(input_path: &Path) -> Result<String, EngineError> {
    let mut input = BufReader::new(File::open(input_path)?);
    let prefix = wire::read_prefix(&mut input, SIGNATURE.len())?;
    match detect_format(&prefix) {
        PkiFormat::StreamingV2 => {
            let mut input = Cursor::new(prefix).chain(input);
            Ok(read_header(&mut input)?.thumbprint)
        }
        PkiFormat::LegacyWrapped | PkiFormat::LegacyEnvelope => {
            legacy::check_file_size(input_path)?;
            let mut bytes = prefix;
            input.take(legacy::MAX_LEGACY_FILE_LEN).read_to_end(&mut bytes)?;
            legacy::thumbprint_of_file(&bytes)
        }
    }
}

/// Look up the recipient certificate through `provider` and decrypt.
///
/// # Errors
///
/// [`EngineError::Validation`] if the provider has no matching certificate,
/// otherwise as [`decrypt_file`].
pub fn decrypt_file_with_provider(
    input_path: &Path,
    output_dir: &Path,
    provider: &dyn CertificateProvider,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    let thumbprint = peek_thumbprint(input_path)?;
    let certificate = provider.find_by_thumbprint(&thumbprint).ok_or_else(|| {
        EngineError::Validation(format!("no certificate with thumbprint {thumbprint} is available"))
    })?;
    decrypt_file(input_path, output_dir, &certificate, config, monitor)
}
