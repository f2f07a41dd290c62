//! File naming: validation of names read from containers, collision-free
//! output paths, and hashed names for encrypted files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use data_encoding::HEXLOWER;
use ring::digest;

use crate::error::EngineError;

/// Longest accepted file name, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Give up looking for a free `name_(n).ext` slot after this many tries.
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Check that `name` is a bare file name that is safe to create on any
/// platform: non-empty, at most [`MAX_FILE_NAME_LEN`] bytes, not `.` or
/// `..`, and free of separators, reserved characters and control codes.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] describing the first problem found.
pub fn validate_file_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("file name is empty".into()));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(EngineError::Validation(format!(
            "file name exceeds {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if name == "." || name == ".." {
        return Err(EngineError::Validation(
            "file name must not be a directory reference".into(),
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(EngineError::Validation(format!(
            "file name contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// Split `name` into stem and extension (with its dot) the way the
/// collision suffix expects: `report.tar.gz` → (`report.tar`, `.gz`),
/// `.profile` → (`.profile`, ``).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => name.split_at(i),
    }
}

fn candidate(dir: &Path, name: &str, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return dir.join(name);
    }
    let (stem, ext) = split_extension(name);
    dir.join(format!("{stem}_({attempt}){ext}"))
}

/// First path in `dir` named `name`, `stem_(1).ext`, `stem_(2).ext`, …
/// that does not exist yet.
///
/// Informational only: [`PendingOutput::create_unique`] claims the slot
/// atomically.
#[must_use]
pub fn unique_output_path(dir: &Path, name: &str) -> PathBuf {
    (0..MAX_COLLISION_SUFFIX)
        .map(|attempt| candidate(dir, name, attempt))
        .find(|path| !path.exists())
        .unwrap_or_else(|| candidate(dir, name, MAX_COLLISION_SUFFIX))
}

/// Which container an encrypted file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedKind {
    Password,
    Certificate,
}

impl EncryptedKind {
    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Password => "enc",
            Self::Certificate => "pki",
        }
    }
}

/// Name for an encrypted copy of `original` that does not reveal it:
/// lowercase hex SHA-256 of the name plus `.enc` or `.pki`.
#[must_use]
pub fn encrypted_file_name(original: &str, kind: EncryptedKind) -> String {
    let hash = digest::digest(&digest::SHA256, original.as_bytes());
    format!("{}.{}", HEXLOWER.encode(hash.as_ref()), kind.extension())
}

// ── Pending output ─────────────────────────────────────────────────

/// An output file that is removed on drop unless [`commit`](Self::commit)
/// succeeded. Every failure or cancellation path therefore leaves nothing
/// behind.
pub(crate) struct PendingOutput {
    path: PathBuf,
    file: Option<File>,
}

impl PendingOutput {
    /// Create `path`, failing if it already exists.
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Create the first free `name` / `stem_(n).ext` in `dir`.
    pub(crate) fn create_unique(dir: &Path, name: &str) -> io::Result<Self> {
        for attempt in 0..MAX_COLLISION_SUFFIX {
            let path = candidate(dir, name, attempt);
            match Self::create(&path) {
                Ok(pending) => return Ok(pending),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free output name for {name} in {}", dir.display()),
        ))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Flush to disk and keep the file.
    pub(crate) fn commit(mut self) -> io::Result<PathBuf> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(std::mem::take(&mut self.path))
    }
}

impl Write for PendingOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::other("output already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().map_or(Ok(()), File::flush)
    }
}

impl Drop for PendingOutput {
    fn drop(&mut self) {
        // A committed output has taken its path.
        if self.path.as_os_str().is_empty() {
            return;
        }
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to remove partial output: {e}");
        } else {
            tracing::debug!(path = %self.path.display(), "partial output removed");
        }
    }
}
