//! Engine settings, stored as plain JSON next to the user's other
//! configuration, never alongside secrets.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Smallest accepted streaming chunk.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Largest accepted streaming chunk.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Highest Brotli quality level.
pub const MAX_COMPRESSION_QUALITY: u32 = 11;

const CONFIG_FILE: &str = "engine.json";

/// Tunables shared by every codec call.
///
/// Persisted to `{config_dir}/engine.json`. Missing fields take their
/// defaults, so older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Bytes read per chunk; one progress report and cancellation check
    /// per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Brotli quality for recovery-capable containers (0–11).
    #[serde(default = "default_compression_quality")]
    pub compression_quality: u32,

    /// Remove the encrypted container after a successful decrypt.
    #[serde(default)]
    pub delete_source: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            compression_quality: default_compression_quality(),
            delete_source: false,
        }
    }
}

const fn default_chunk_size() -> usize {
    81_920
}
const fn default_compression_quality() -> u32 {
    1
}

impl EngineConfig {
    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(EngineError::Config(format!(
                "chunkSize must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.compression_quality > MAX_COMPRESSION_QUALITY {
            return Err(EngineError::Config(format!(
                "compressionQuality must be at most {MAX_COMPRESSION_QUALITY}, got {}",
                self.compression_quality
            )));
        }
        Ok(())
    }

    /// Load from `{config_dir}/engine.json`.
    ///
    /// Returns [`Default::default()`] when the file is missing, unreadable,
    /// or fails validation.
    #[must_use]
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(CONFIG_FILE);
        let Ok(contents) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(&contents) {
            Ok(config) if config.validate().is_ok() => config,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %path.display(), "ignoring invalid engine config");
                Self::default()
            }
        }
    }

    /// Persist to `{config_dir}/engine.json` via a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the settings are out of range, or
    /// [`EngineError::Io`] if the directory is missing or not writable.
    pub fn save(&self, config_dir: &Path) -> Result<(), EngineError> {
        self.validate()?;
        let path = config_dir.join(CONFIG_FILE);
        let tmp = config_dir.join(".engine.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Config(e.to_string()))?;
        fs::write(&tmp, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
