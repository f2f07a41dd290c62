//! Certificate lookup for decryption and recipient selection.

use std::fs;
use std::path::Path;

use fileenc_crypto_core::{Certificate, CertificateInfo};

use crate::error::EngineError;

/// Source of certificates the user can encrypt to or decrypt with.
pub trait CertificateProvider {
    /// Certificates that are currently within their validity window,
    /// sorted by friendly name (case-insensitive).
    fn list_available(&self) -> Vec<CertificateInfo>;

    /// The certificate with `thumbprint` (case-insensitive), preferring one
    /// that carries a private key.
    fn find_by_thumbprint(&self, thumbprint: &str) -> Option<Certificate>;
}

/// A [`CertificateProvider`] over certificates held in memory, typically
/// loaded from a directory of exported JSON files.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCertificateStore {
    certificates: Vec<Certificate>,
}

impl InMemoryCertificateStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            certificates: Vec::new(),
        }
    }

    /// Add `certificate`. An entry with the same thumbprint is replaced,
    /// unless it has a private key and the new one does not.
    pub fn insert(&mut self, certificate: Certificate) {
        match self
            .certificates
            .iter_mut()
            .find(|c| c.matches_thumbprint(certificate.thumbprint()))
        {
            Some(existing) if existing.has_private_key() && !certificate.has_private_key() => {}
            Some(existing) => *existing = certificate,
            None => self.certificates.push(certificate),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Load every `*.json` certificate in `dir`.
    ///
    /// Files that fail to parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if `dir` cannot be read.
    pub fn from_dir(dir: &Path) -> Result<Self, EngineError> {
        let mut store = Self::new();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .collect();
        paths.sort();

        for path in paths {
            let loaded = fs::read_to_string(&path)
                .map_err(EngineError::from)
                .and_then(|json| Certificate::import_json(&json).map_err(EngineError::from));
            match loaded {
                Ok(certificate) => {
                    tracing::debug!(
                        path = %path.display(),
                        thumbprint = %certificate.thumbprint(),
                        "certificate loaded"
                    );
                    store.insert(certificate);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping certificate file: {e}");
                }
            }
        }
        Ok(store)
    }
}

impl CertificateProvider for InMemoryCertificateStore {
    fn list_available(&self) -> Vec<CertificateInfo> {
        let mut infos: Vec<CertificateInfo> = self
            .certificates
            .iter()
            .filter(|c| c.is_valid_for_encryption())
            .map(|c| c.info().clone())
            .collect();
        infos.sort_by_cached_key(|info| info.friendly_name.to_lowercase());
        infos
    }

    fn find_by_thumbprint(&self, thumbprint: &str) -> Option<Certificate> {
        let mut matches = self
            .certificates
            .iter()
            .filter(|c| c.matches_thumbprint(thumbprint));
        let first = matches.next()?;
        if first.has_private_key() {
            return Some(first.clone());
        }
        Some(matches.find(|c| c.has_private_key()).unwrap_or(first).clone())
    }
}
