//! Password containers, with optional recovery phrase.
//!
//! Two on-disk versions:
//!
//! - **Recovery-capable** (`FENC_v2`):
//!   `[signature:7][salt:32][iv:16][i32 len][wrapped password]` in the clear,
//!   then `AES-CBC(string name + i64 length + Brotli(content))`.
//! - **Legacy** (no signature): `[salt:32][iv:16]` then
//!   `AES-CBC(string name + i64 length + content)`.
//!
//! The content key is always `PBKDF2(password, salt)`. A recovery phrase
//! only unwraps the stored password; it never decrypts content directly.
//!
//! New containers are always written as `FENC_v2`.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use fileenc_crypto_core::kdf::{self, SALT_LEN};
use fileenc_crypto_core::recovery::{self, RecoveryPhrase};
use fileenc_crypto_core::symmetric::{self, CbcReader, CbcWriter, IV_LEN};
use fileenc_crypto_core::wrapping;
use zeroize::Zeroizing;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::naming::{self, PendingOutput, MAX_FILE_NAME_LEN};
use crate::progress::{pump, Monitor, Tracker};
use crate::wire;

/// Magic prefix of recovery-capable containers.
pub const SIGNATURE: &[u8; 7] = b"FENC_v2";

/// Upper bound on the wrapped-password blob.
pub const MAX_WRAPPED_LEN: usize = 4096;

/// Brotli window (`lgwin`), the library default.
const BROTLI_WINDOW: u32 = 22;

/// Internal buffer of the Brotli reader/writer.
const BROTLI_BUFFER: usize = 4096;

/// Secret offered for decryption.
#[derive(Clone, Copy)]
pub enum Secret<'a> {
    /// The password the file was encrypted with.
    Password(&'a str),
    /// The twelve-word phrase returned at encryption time.
    RecoveryPhrase(&'a str),
}

impl std::fmt::Debug for Secret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Secret::Password(***)"),
            Self::RecoveryPhrase(_) => f.write_str("Secret::RecoveryPhrase(***)"),
        }
    }
}

/// Container version, decided by the signature alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVersion {
    /// No signature; password only.
    Legacy,
    /// `FENC_v2`; password or recovery phrase.
    RecoveryCapable,
}

impl ContainerVersion {
    /// Classify the first bytes of a container.
    #[must_use]
    pub fn from_prefix(prefix: &[u8]) -> Self {
        if prefix.starts_with(SIGNATURE) {
            Self::RecoveryCapable
        } else {
            Self::Legacy
        }
    }

    #[must_use]
    pub const fn supports_recovery(self) -> bool {
        matches!(self, Self::RecoveryCapable)
    }
}

/// Read the signature bytes from `reader` and classify the container.
///
/// # Errors
///
/// Returns any I/O error from `reader`.
pub fn detect_version<R: Read + ?Sized>(reader: &mut R) -> io::Result<ContainerVersion> {
    let prefix = wire::read_prefix(reader, SIGNATURE.len())?;
    Ok(ContainerVersion::from_prefix(&prefix))
}

// ── Encrypt ────────────────────────────────────────────────────────

/// Encrypt `input_len` bytes from `input` into `output` as a `FENC_v2`
/// container, returning the freshly generated recovery phrase.
///
/// The phrase is the only way to recover the password later; the caller
/// must show or store it.
///
/// # Errors
///
/// - [`EngineError::Validation`] for an empty password, unsafe
///   `file_name`, or input whose length differs from `input_len`
/// - [`EngineError::Config`] for out-of-range settings
/// - [`EngineError::Cancelled`] if `monitor` requested cancellation
/// - [`EngineError::Io`] for read or write failures
pub fn encrypt_stream<R: Read, W: Write>(
    mut input: R,
    input_len: u64,
    file_name: &str,
    mut output: W,
    password: &str,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<RecoveryPhrase, EngineError> {
    config.validate()?;
    if password.is_empty() {
        return Err(EngineError::Validation("password must not be empty".into()));
    }
    naming::validate_file_name(file_name)?;
    let declared = i64::try_from(input_len)
        .map_err(|_| EngineError::Validation("input is too large".into()))?;
    monitor.check_cancelled()?;

    let (phrase, recovery_key) = recovery::generate()?;
    let salt = kdf::generate_salt();
    let key = kdf::derive_key(password.as_bytes(), &salt)?;
    let iv = symmetric::generate_iv();
    let wrapped = wrapping::wrap_password(password, &recovery_key, &salt)?;

    output.write_all(SIGNATURE)?;
    output.write_all(&salt)?;
    output.write_all(&iv)?;
    wire::write_blob(&mut output, &wrapped)?;
    tracing::debug!(file = file_name, "container header written");

    let mut cipher = CbcWriter::new(output, key.expose(), &iv);
    wire::write_string(&mut cipher, file_name)?;
    wire::write_i64(&mut cipher, declared)?;

    let mut compressor = brotli::CompressorWriter::new(
        cipher,
        BROTLI_BUFFER,
        config.compression_quality,
        BROTLI_WINDOW,
    );
    let mut tracker = Tracker::new(monitor, input_len);
    tracing::debug!(file = file_name, bytes = input_len, "streaming content");
    let read = pump(
        &mut input,
        &mut compressor,
        config.chunk_size,
        &mut tracker,
        EngineError::Io,
    )?;
    if read != input_len {
        return Err(EngineError::Validation(format!(
            "input changed size while reading: expected {input_len} bytes, read {read}"
        )));
    }

    compressor.flush()?;
    let cipher = compressor.into_inner();
    let mut output = cipher.finish()?;
    output.flush()?;

    tracker.finish();
    tracing::info!(file = file_name, bytes = input_len, "file encrypted");
    Ok(phrase)
}

/// Encrypt the file at `input_path` into a new file at `output_path`.
///
/// The stored name is the input's file name. `output_path` must not exist;
/// it is removed again on any failure or cancellation.
///
/// # Errors
///
/// As [`encrypt_stream`], plus [`EngineError::Io`] if `output_path` exists.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    password: &str,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<RecoveryPhrase, EngineError> {
    let file_name = source_file_name(input_path)?;
    let input = File::open(input_path)?;
    let input_len = input.metadata()?.len();

    let mut pending = PendingOutput::create(output_path)?;
    let phrase = encrypt_stream(
        BufReader::new(input),
        input_len,
        file_name,
        BufWriter::new(&mut pending),
        password,
        config,
        monitor,
    )?;
    pending.commit()?;
    Ok(phrase)
}

pub(crate) fn source_file_name(path: &Path) -> Result<&str, EngineError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::Validation(format!("{} has no file name", path.display())))
}

// ── Decrypt ────────────────────────────────────────────────────────

/// Decrypt a container from `input` into a new file in `output_dir`,
/// returning its path.
///
/// The output name comes from the container and gets a `_(n)` suffix
/// if taken. The header is fully parsed before the output is created.
///
/// # Errors
///
/// - [`EngineError::NoRecoveryPhrase`] for a recovery phrase on a legacy
///   container
/// - [`EngineError::Validation`] for an empty password or malformed phrase
/// - [`EngineError::Format`] for a truncated or inconsistent container
/// - [`EngineError::IncorrectPassword`] / [`EngineError::IncorrectRecoveryPhrase`]
///   when the secret is wrong or the ciphertext is corrupt
/// - [`EngineError::Cancelled`] and [`EngineError::Io`]
pub fn decrypt_stream<R: Read>(
    mut input: R,
    output_dir: &Path,
    secret: &Secret<'_>,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    config.validate()?;
    let prefix = wire::read_prefix(&mut input, SIGNATURE.len())?;

    match (ContainerVersion::from_prefix(&prefix), secret) {
        (ContainerVersion::RecoveryCapable, _) => {
            tracing::debug!("recovery-capable container");
            decrypt_recovery_capable(input, output_dir, secret, config, monitor)
        }
        (ContainerVersion::Legacy, Secret::RecoveryPhrase(_)) => {
            Err(EngineError::NoRecoveryPhrase)
        }
        (ContainerVersion::Legacy, Secret::Password(password)) => {
            tracing::debug!("legacy container");
            let input = Cursor::new(prefix).chain(input);
            decrypt_legacy(input, output_dir, password, config, monitor)
        }
    }
}

/// Decrypt the container at `input_path` into `output_dir`.
///
/// The container is deleted afterwards only when
/// [`EngineConfig::delete_source`] is set.
///
/// # Errors
///
/// As [`decrypt_stream`].
pub fn decrypt_file(
    input_path: &Path,
    output_dir: &Path,
    secret: &Secret<'_>,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    let input = BufReader::new(File::open(input_path)?);
    let output = decrypt_stream(input, output_dir, secret, config, monitor)?;
    if config.delete_source {
        remove_source(input_path);
    }
    Ok(output)
}

/// Remove a decrypted container. The plaintext is already committed, so a
/// failure here is only logged.
pub(crate) fn remove_source(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "source container deleted"),
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to delete source container: {e}");
        }
    }
}

fn read_array<const N: usize, R: Read>(input: &mut R) -> Result<[u8; N], EngineError> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn truncated(e: io::Error) -> EngineError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => EngineError::Format("container header is truncated".into()),
        io::ErrorKind::InvalidData => EngineError::Format(format!("invalid container header: {e}")),
        _ => EngineError::Io(e),
    }
}

/// Padding, truncation and decompression failures look the same as a
/// wrong key from here.
fn body_error(e: io::Error, auth: fn() -> EngineError) -> EngineError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => auth(),
        _ => EngineError::Io(e),
    }
}

const fn wrong_password() -> EngineError {
    EngineError::IncorrectPassword
}

const fn wrong_phrase() -> EngineError {
    EngineError::IncorrectRecoveryPhrase
}

fn decrypt_recovery_capable<R: Read>(
    mut input: R,
    output_dir: &Path,
    secret: &Secret<'_>,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    let salt: [u8; SALT_LEN] = read_array(&mut input)?;
    let iv: [u8; IV_LEN] = read_array(&mut input)?;
    let wrapped = wire::read_blob(&mut input, MAX_WRAPPED_LEN).map_err(truncated)?;

    let (password, auth): (Zeroizing<String>, fn() -> EngineError) = match secret {
        Secret::Password(password) => {
            if password.is_empty() {
                return Err(EngineError::Validation("password must not be empty".into()));
            }
            (Zeroizing::new((*password).to_owned()), wrong_password)
        }
        Secret::RecoveryPhrase(phrase) => {
            let phrase = RecoveryPhrase::parse(phrase)
                .map_err(|e| EngineError::Validation(e.to_string()))?;
            let recovery_key = phrase.derive_key()?;
            let password = wrapping::unwrap_password(&wrapped, &recovery_key, &salt)
                .map_err(|_| EngineError::IncorrectRecoveryPhrase)?;
            tracing::debug!("password recovered from phrase");
            (password, wrong_phrase)
        }
    };

    let key = kdf::derive_key(password.as_bytes(), &salt)?;
    let mut cipher = CbcReader::new(input, key.expose(), &iv);
    let (file_name, declared) = read_inner_header(&mut cipher, auth)?;

    let written = {
        // One byte past the declared length is enough to detect a mismatch.
        let mut body = brotli::Decompressor::new(&mut cipher, BROTLI_BUFFER)
            .take(declared.saturating_add(1));
        write_output(&mut body, output_dir, &file_name, declared, config, monitor, auth)?
    };
    // Reach the final block so its padding is checked.
    io::copy(&mut cipher, &mut io::sink()).map_err(|e| body_error(e, auth))?;
    written.finish(&file_name, declared)
}

fn decrypt_legacy<R: Read>(
    mut input: R,
    output_dir: &Path,
    password: &str,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
) -> Result<PathBuf, EngineError> {
    if password.is_empty() {
        return Err(EngineError::Validation("password must not be empty".into()));
    }
    let salt: [u8; SALT_LEN] = read_array(&mut input)?;
    let iv: [u8; IV_LEN] = read_array(&mut input)?;

    let key = kdf::derive_key(password.as_bytes(), &salt)?;
    let mut cipher = CbcReader::new(input, key.expose(), &iv);
    let (file_name, declared) = read_inner_header(&mut cipher, wrong_password)?;

    let written = write_output(
        &mut cipher,
        output_dir,
        &file_name,
        declared,
        config,
        monitor,
        wrong_password,
    )?;
    written.finish(&file_name, declared)
}

/// Name and declared length at the start of the encrypted section. Any
/// failure here is reported as `auth()`.
fn read_inner_header<R: Read>(
    cipher: &mut R,
    auth: fn() -> EngineError,
) -> Result<(String, u64), EngineError> {
    let file_name =
        wire::read_string(cipher, MAX_FILE_NAME_LEN).map_err(|e| body_error(e, auth))?;
    let declared = wire::read_i64(cipher).map_err(|e| body_error(e, auth))?;
    let declared = u64::try_from(declared).map_err(|_| auth())?;
    if let Err(e) = naming::validate_file_name(&file_name) {
        tracing::debug!("stored file name rejected: {e}");
        return Err(auth());
    }
    tracing::debug!(file = %file_name, bytes = declared, "container header parsed");
    Ok((file_name, declared))
}

/// A fully written but not yet committed plaintext.
pub(crate) struct Written {
    pending: PendingOutput,
    bytes: u64,
}

impl Written {
    pub(crate) fn finish(self, file_name: &str, declared: u64) -> Result<PathBuf, EngineError> {
        if self.bytes != declared {
            return Err(EngineError::Format(format!(
                "declared {declared} bytes but decrypted {}",
                self.bytes
            )));
        }
        let path = self.pending.commit()?;
        tracing::info!(
            file = file_name,
            path = %path.display(),
            bytes = declared,
            "file decrypted"
        );
        Ok(path)
    }
}

/// Stream `body` into a new collision-free file named `file_name`.
pub(crate) fn write_output<R: Read + ?Sized>(
    body: &mut R,
    output_dir: &Path,
    file_name: &str,
    declared: u64,
    config: &EngineConfig,
    monitor: &Monitor<'_>,
    auth: fn() -> EngineError,
) -> Result<Written, EngineError> {
    monitor.check_cancelled()?;
    let mut pending = PendingOutput::create_unique(output_dir, file_name)?;
    tracing::debug!(path = %pending.path().display(), "writing plaintext");

    let mut tracker = Tracker::new(monitor, declared);
    let bytes = {
        let mut out = BufWriter::new(&mut pending);
        let bytes = pump(body, &mut out, config.chunk_size, &mut tracker, |e| {
            body_error(e, auth)
        })?;
        out.flush()?;
        bytes
    };
    if bytes == declared {
        tracker.finish();
    }
    Ok(Written { pending, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn encrypt_bytes(data: &[u8], name: &str, password: &str) -> (Vec<u8>, RecoveryPhrase) {
        let mut out = Vec::new();
        let phrase = encrypt_stream(
            data,
            data.len() as u64,
            name,
            &mut out,
            password,
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap();
        (out, phrase)
    }

    /// Build a legacy container the way older releases wrote them.
    fn legacy_container(data: &[u8], name: &str, password: &str) -> Vec<u8> {
        let salt = kdf::generate_salt();
        let iv = symmetric::generate_iv();
        let key = kdf::derive_key(password.as_bytes(), &salt).unwrap();
        let mut plain = Vec::new();
        wire::write_string(&mut plain, name).unwrap();
        wire::write_i64(&mut plain, data.len() as i64).unwrap();
        plain.extend_from_slice(data);
        let mut out = salt.to_vec();
        out.extend_from_slice(&iv);
        out.extend_from_slice(&symmetric::encrypt(&plain, key.expose(), &iv).unwrap());
        out
    }

    /// A `FENC_v2` container whose inner header understates the body.
    fn understated_container(data: &[u8], declared: i64, password: &str) -> Vec<u8> {
        let (_, recovery_key) = recovery::generate().unwrap();
        let salt = kdf::generate_salt();
        let iv = symmetric::generate_iv();
        let key = kdf::derive_key(password.as_bytes(), &salt).unwrap();
        let wrapped = wrapping::wrap_password(password, &recovery_key, &salt).unwrap();

        let mut out = SIGNATURE.to_vec();
        out.extend_from_slice(&salt);
        out.extend_from_slice(&iv);
        wire::write_blob(&mut out, &wrapped).unwrap();

        let mut cipher = CbcWriter::new(out, key.expose(), &iv);
        wire::write_string(&mut cipher, "big.bin").unwrap();
        wire::write_i64(&mut cipher, declared).unwrap();
        let mut compressor =
            brotli::CompressorWriter::new(cipher, BROTLI_BUFFER, 1, BROTLI_WINDOW);
        compressor.write_all(data).unwrap();
        compressor.into_inner().finish().unwrap()
    }

    #[test]
    fn body_longer_than_declared_stops_one_byte_past() {
        let dir = TempDir::new().unwrap();
        let container = understated_container(&[7u8; 200_000], 3, "pw");
        let err = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::Password("pw"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        match err {
            EngineError::Format(msg) => assert!(msg.contains("decrypted 4"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn header_layout() {
        let (container, _) = encrypt_bytes(b"hello", "a.txt", "pw");
        assert_eq!(&container[..7], SIGNATURE);
        let wrapped_len = i32::from_le_bytes(container[55..59].try_into().unwrap());
        // iv + one padded block for a two-byte password
        assert_eq!(wrapped_len, 32);
        assert_eq!((container.len() - 59 - 32) % 16, 0);
    }

    #[test]
    fn password_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (container, _) = encrypt_bytes(b"contenido secreto", "nota.txt", "clave");
        let path = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::Password("clave"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap();
        assert_eq!(path, dir.path().join("nota.txt"));
        assert_eq!(fs::read(path).unwrap(), b"contenido secreto");
    }

    #[test]
    fn recovery_phrase_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (container, phrase) = encrypt_bytes(b"data", "d.bin", "pw");
        let path = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::RecoveryPhrase(phrase.expose()),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap();
        assert_eq!(fs::read(path).unwrap(), b"data");
    }

    #[test]
    fn empty_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (container, _) = encrypt_bytes(b"", "empty", "pw");
        let path = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::Password("pw"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap();
        assert!(fs::read(path).unwrap().is_empty());
    }

    #[test]
    fn wrong_password_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let (container, _) = encrypt_bytes(&[5u8; 5000], "x.bin", "right");
        let err = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::Password("wrong"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::IncorrectPassword), "{err:?}");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn legacy_container_decrypts_with_password() {
        let dir = TempDir::new().unwrap();
        let container = legacy_container(b"old format", "viejo.doc", "pw");
        assert_eq!(
            detect_version(&mut container.as_slice()).unwrap(),
            ContainerVersion::Legacy
        );
        let path = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::Password("pw"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap();
        assert_eq!(path, dir.path().join("viejo.doc"));
        assert_eq!(fs::read(path).unwrap(), b"old format");
    }

    #[test]
    fn legacy_container_rejects_recovery_phrase() {
        let dir = TempDir::new().unwrap();
        let container = legacy_container(b"x", "x", "pw");
        let (phrase, _) = recovery::generate().unwrap();
        let err = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::RecoveryPhrase(phrase.expose()),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NoRecoveryPhrase));
    }

    #[test]
    fn malformed_phrase_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let (container, _) = encrypt_bytes(b"x", "x", "pw");
        let err = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::RecoveryPhrase("not a phrase"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn oversized_wrapped_length_is_format_error() {
        let dir = TempDir::new().unwrap();
        let mut container = SIGNATURE.to_vec();
        container.extend_from_slice(&[0u8; SALT_LEN + IV_LEN]);
        container.extend_from_slice(&(MAX_WRAPPED_LEN as i32 + 1).to_le_bytes());
        let err = decrypt_stream(
            container.as_slice(),
            dir.path(),
            &Secret::Password("pw"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Format(_)), "{err:?}");
    }

    #[test]
    fn truncated_header_is_format_error() {
        let dir = TempDir::new().unwrap();
        let err = decrypt_stream(
            &SIGNATURE[..],
            dir.path(),
            &Secret::Password("pw"),
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Format(_)), "{err:?}");
    }

    #[test]
    fn unsafe_name_refused_on_encrypt() {
        let err = encrypt_stream(
            &b"x"[..],
            1,
            "../escape",
            Vec::new(),
            "pw",
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn short_input_is_validation_error() {
        let err = encrypt_stream(
            &b"abc"[..],
            10,
            "a",
            Vec::new(),
            "pw",
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn empty_password_rejected() {
        let err = encrypt_stream(
            &b"abc"[..],
            3,
            "a",
            Vec::new(),
            "",
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn secret_debug_is_masked() {
        let shown = format!("{:?}", Secret::Password("hunter2"));
        assert!(!shown.contains("hunter2"));
    }
}
