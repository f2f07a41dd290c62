#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for certificate containers: the streaming
//! `FILEENC_PKI_V2` format, the legacy envelopes, and lookup through a
//! certificate provider.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use fileenc_crypto_core::Certificate;
use fileenc_engine::envelope::legacy::{self, LegacyPkiFile, MAX_LEGACY_FILE_LEN};
use fileenc_engine::envelope::{self, SIGNATURE};
use fileenc_engine::{
    CancellationToken, CertificateProvider, EngineConfig, EngineError, ErrorKind,
    InMemoryCertificateStore, Monitor, NeverCancelled, PkiFormat,
};
use rand::rngs::OsRng;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// 1024-bit keys keep the suite fast.
fn recipient() -> &'static Certificate {
    static CERT: OnceLock<Certificate> = OnceLock::new();
    CERT.get_or_init(|| {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        Certificate::from_private_key("CN=Recipient", key, 1).unwrap()
    })
}

fn stranger() -> &'static Certificate {
    static CERT: OnceLock<Certificate> = OnceLock::new();
    CERT.get_or_init(|| {
        let key = rsa::RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        Certificate::from_private_key("CN=Stranger", key, 1).unwrap()
    })
}

fn write_input(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

fn encrypt_to(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let input = write_input(dir, name, data);
    let output = dir.join(format!("{name}.pki"));
    envelope::encrypt_file(
        &input,
        &output,
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap();
    output
}

/// Incompressible-looking content so chunk counts stay predictable.
fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(2_654_435_761) >> 7) as u8).collect()
}

fn small_chunks() -> EngineConfig {
    EngineConfig {
        chunk_size: 4096,
        ..EngineConfig::default()
    }
}

fn is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

// ---------------------------------------------------------------------------
// Streaming container
// ---------------------------------------------------------------------------

#[test]
fn streaming_roundtrip_restores_name_and_content() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let encrypted = encrypt_to(src.path(), "ledger.csv", &data);

    let bytes = fs::read(&encrypted).unwrap();
    assert!(bytes.starts_with(SIGNATURE));
    assert_eq!(envelope::detect_format(&bytes), PkiFormat::StreamingV2);

    let header = envelope::read_header(&mut bytes.as_slice()).unwrap();
    assert_eq!(header.file_name, "ledger.csv");
    assert_eq!(header.original_size, 300_000);
    assert_eq!(header.thumbprint, recipient().thumbprint());
    assert_eq!(header.wrapped_key.len(), 128);

    let restored = envelope::decrypt_file(
        &encrypted,
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap();
    assert_eq!(restored, out.path().join("ledger.csv"));
    assert_eq!(fs::read(restored).unwrap(), data);
}

#[test]
fn empty_file_roundtrip() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let encrypted = encrypt_to(src.path(), "empty.txt", b"");
    let restored = envelope::decrypt_file(
        &encrypted,
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap();
    assert!(fs::read(restored).unwrap().is_empty());
}

#[test]
fn wrong_certificate_detected_from_header() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let encrypted = encrypt_to(src.path(), "a.txt", b"for the recipient only");

    let err = envelope::decrypt_file(
        &encrypted,
        out.path(),
        stranger(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    match &err {
        EngineError::WrongCertificate { expected, actual } => {
            assert_eq!(expected, recipient().thumbprint());
            assert_eq!(actual, stranger().thumbprint());
        }
        other => panic!("expected WrongCertificate, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(is_empty(out.path()));
}

#[test]
fn public_only_certificate_cannot_decrypt() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let encrypted = encrypt_to(src.path(), "a.txt", b"data");

    let err = envelope::decrypt_file(
        &encrypted,
        out.path(),
        &recipient().public_only(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err:?}");
    assert!(is_empty(out.path()));
}

#[test]
fn public_only_certificate_can_encrypt() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_input(src.path(), "memo.txt", b"sealed with the public key");
    let encrypted = src.path().join("memo.pki");
    envelope::encrypt_file(
        &input,
        &encrypted,
        &recipient().public_only(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap();

    let restored = envelope::decrypt_file(
        &encrypted,
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap();
    assert_eq!(fs::read(restored).unwrap(), b"sealed with the public key");
}

#[test]
fn tampered_wrapped_key_is_incorrect_certificate() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let encrypted = encrypt_to(src.path(), "a.txt", b"data");
    let mut bytes = fs::read(&encrypted).unwrap();
    let header = envelope::read_header(&mut bytes.as_slice()).unwrap();

    let pos = bytes
        .windows(header.wrapped_key.len())
        .position(|w| w == header.wrapped_key.as_slice())
        .unwrap();
    bytes[pos + 5] ^= 0xFF;

    let err = envelope::decrypt_stream(
        Cursor::new(bytes),
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::IncorrectCertificate), "{err:?}");
    assert!(is_empty(out.path()));
}

#[test]
fn stream_without_signature_is_legacy_format() {
    let out = TempDir::new().unwrap();
    let err = envelope::decrypt_stream(
        Cursor::new(b"FILEENC_PKI_V1{}".to_vec()),
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::LegacyFormat));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn delete_source_removes_container() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let encrypted = encrypt_to(src.path(), "a.txt", b"data");
    let config = EngineConfig {
        delete_source: true,
        ..EngineConfig::default()
    };
    envelope::decrypt_file(&encrypted, out.path(), recipient(), &config, &Monitor::silent())
        .unwrap();
    assert!(!encrypted.exists());
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

#[test]
fn progress_is_monotonic_and_reaches_hundred() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_input(src.path(), "big.bin", &patterned(1024 * 1024));
    let encrypted = src.path().join("big.pki");
    let config = small_chunks();

    for phase in ["encrypt", "decrypt"] {
        let reports = RefCell::new(Vec::new());
        let sink = |p: f64| reports.borrow_mut().push(p);
        let monitor = Monitor::new(&sink, &NeverCancelled);
        if phase == "encrypt" {
            envelope::encrypt_file(&input, &encrypted, recipient(), &config, &monitor).unwrap();
        } else {
            envelope::decrypt_file(&encrypted, out.path(), recipient(), &config, &monitor)
                .unwrap();
        }

        let reports = reports.into_inner();
        assert!(reports.len() >= 16, "{phase}: one report per chunk");
        assert!(reports.windows(2).all(|w| w[0] <= w[1]), "{phase}: monotonic");
        assert!(reports.iter().all(|p| (0.0..=100.0).contains(p)));
        assert!((reports.last().copied().unwrap() - 100.0).abs() < f64::EPSILON);
    }
}

#[test]
fn cancelled_encrypt_removes_partial_output() {
    let src = TempDir::new().unwrap();
    let input = write_input(src.path(), "big.bin", &patterned(2 * 1024 * 1024));
    let encrypted = src.path().join("big.pki");

    let token = CancellationToken::new();
    let sink = |p: f64| {
        if p > 10.0 {
            token.cancel();
        }
    };
    let err = envelope::encrypt_file(
        &input,
        &encrypted,
        recipient(),
        &small_chunks(),
        &Monitor::new(&sink, &token),
    )
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!encrypted.exists());
}

#[test]
fn cancelled_decrypt_leaves_output_dir_empty() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let input = write_input(src.path(), "big.bin", &patterned(2 * 1024 * 1024));
    let encrypted = src.path().join("big.pki");
    let config = EngineConfig {
        delete_source: true,
        ..small_chunks()
    };
    envelope::encrypt_file(&input, &encrypted, recipient(), &config, &Monitor::silent())
        .unwrap();

    let token = CancellationToken::new();
    let sink = |p: f64| {
        if p > 50.0 {
            token.cancel();
        }
    };
    let err = envelope::decrypt_file(
        &encrypted,
        out.path(),
        recipient(),
        &config,
        &Monitor::new(&sink, &token),
    )
    .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert!(is_empty(out.path()));
    assert!(encrypted.exists());
}

// ---------------------------------------------------------------------------
// Legacy formats
// ---------------------------------------------------------------------------

#[test]
fn legacy_buffer_roundtrip() {
    let text = legacy::encrypt_buffer(b"legacy payload", recipient()).unwrap();
    assert!(text.is_ascii());
    let plain = legacy::decrypt_buffer(&text, recipient()).unwrap();
    assert_eq!(plain.as_slice(), b"legacy payload");

    assert!(matches!(
        legacy::decrypt_buffer(&text, stranger()),
        Err(EngineError::WrongCertificate { .. })
    ));
}

#[test]
fn legacy_wrapped_file_decrypts_through_dispatch() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let document = LegacyPkiFile::seal("old-report.docx", b"from an old release", recipient())
        .unwrap();
    let path = write_input(src.path(), "old.pki", &document.to_bytes().unwrap());
    assert_eq!(
        envelope::detect_format(&fs::read(&path).unwrap()),
        PkiFormat::LegacyWrapped
    );

    let progress = std::cell::RefCell::new(Vec::new());
    let sink = |p: f64| progress.borrow_mut().push(p);
    let restored = envelope::decrypt_file(
        &path,
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::new(&sink, &fileenc_engine::NeverCancelled),
    )
    .unwrap();
    assert_eq!(restored, out.path().join("old-report.docx"));
    assert_eq!(fs::read(restored).unwrap(), b"from an old release");
    assert_eq!(progress.into_inner(), vec![100.0]);
}

#[test]
fn bare_envelope_is_named_after_input() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let text = legacy::encrypt_buffer(b"bare", recipient()).unwrap();
    let path = write_input(src.path(), "notes.txt.pki", text.as_bytes());
    assert_eq!(
        envelope::detect_format(text.as_bytes()),
        PkiFormat::LegacyEnvelope
    );

    let restored = envelope::decrypt_file(
        &path,
        out.path(),
        recipient(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap();
    assert_eq!(restored, out.path().join("notes.txt"));
    assert_eq!(fs::read(restored).unwrap(), b"bare");
}

#[test]
fn legacy_wrong_certificate_leaves_no_output() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let document = LegacyPkiFile::seal("x.txt", b"x", recipient()).unwrap();
    let path = write_input(src.path(), "x.pki", &document.to_bytes().unwrap());

    let err = envelope::decrypt_file(
        &path,
        out.path(),
        stranger(),
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::WrongCertificate { .. }));
    assert!(is_empty(out.path()));
}

#[test]
fn oversized_legacy_file_is_refused_before_reading() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let path = src.path().join("huge.pki");
    // Sparse: no signature, so it sniffs as a bare legacy envelope.
    File::create(&path)
        .unwrap()
        .set_len(MAX_LEGACY_FILE_LEN + 1)
        .unwrap();

    let err = envelope::peek_thumbprint(&path).unwrap_err();
    assert!(matches!(err, EngineError::Format(_)), "{err:?}");

    let store = InMemoryCertificateStore::new();
    let err = envelope::decrypt_file_with_provider(
        &path,
        out.path(),
        &store,
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(is_empty(out.path()));
}

// ---------------------------------------------------------------------------
// Provider lookup
// ---------------------------------------------------------------------------

#[test]
fn provider_finds_recipient_for_every_format() {
    let src = TempDir::new().unwrap();
    let mut store = InMemoryCertificateStore::new();
    store.insert(stranger().clone());
    store.insert(recipient().clone());
    assert_eq!(store.list_available().len(), 2);

    let streaming = encrypt_to(src.path(), "stream.txt", b"streaming");
    let wrapped = write_input(
        src.path(),
        "wrapped.pki",
        &LegacyPkiFile::seal("wrapped.txt", b"wrapped", recipient())
            .unwrap()
            .to_bytes()
            .unwrap(),
    );
    let bare = write_input(
        src.path(),
        "bare.pki",
        legacy::encrypt_buffer(b"bare", recipient()).unwrap().as_bytes(),
    );

    for (path, expected) in [
        (streaming, b"streaming".as_slice()),
        (wrapped, b"wrapped".as_slice()),
        (bare, b"bare".as_slice()),
    ] {
        assert_eq!(
            envelope::peek_thumbprint(&path).unwrap(),
            recipient().thumbprint()
        );
        let out = TempDir::new().unwrap();
        let restored = envelope::decrypt_file_with_provider(
            &path,
            out.path(),
            &store,
            &EngineConfig::default(),
            &Monitor::silent(),
        )
        .unwrap();
        assert_eq!(fs::read(restored).unwrap(), expected);
    }
}

#[test]
fn provider_without_recipient_is_validation_error() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let encrypted = encrypt_to(src.path(), "a.txt", b"data");
    let mut store = InMemoryCertificateStore::new();
    store.insert(stranger().clone());

    let err = envelope::decrypt_file_with_provider(
        &encrypted,
        out.path(),
        &store,
        &EngineConfig::default(),
        &Monitor::silent(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn store_loaded_from_exported_files() {
    let certs = TempDir::new().unwrap();
    fs::write(
        certs.path().join("recipient.json"),
        recipient().export_json(true).unwrap().as_str(),
    )
    .unwrap();
    fs::write(
        certs.path().join("stranger.json"),
        stranger().export_json(false).unwrap().as_str(),
    )
    .unwrap();

    let store = InMemoryCertificateStore::from_dir(certs.path()).unwrap();
    assert_eq!(store.len(), 2);
    let found = store.find_by_thumbprint(recipient().thumbprint()).unwrap();
    assert!(found.has_private_key());
    assert!(!store
        .find_by_thumbprint(stranger().thumbprint())
        .unwrap()
        .has_private_key());
}
