//! `fileenc-engine`: file container pipelines for FileEncrypter.
//!
//! Streams files through the password container (`FENC_v2` and the
//! unsigned legacy layout) and the certificate envelope
//! (`FILEENC_PKI_V2` plus the older whole-buffer formats). Every
//! operation takes an [`EngineConfig`] and a [`Monitor`] for progress
//! and cancellation, and removes partial output on failure.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

pub mod config;
pub mod progress;
pub mod wire;

pub mod naming;

pub mod container;
pub mod envelope;

pub mod certificates;

pub use certificates::{CertificateProvider, InMemoryCertificateStore};
pub use config::EngineConfig;
pub use container::{ContainerVersion, Secret};
pub use envelope::{EnvelopeHeader, PkiFormat};
pub use error::{EngineError, ErrorKind};
pub use naming::{encrypted_file_name, EncryptedKind};
pub use progress::{
    CancellationSource, CancellationToken, Monitor, NeverCancelled, NoProgress, ProgressSink,
};
