//! AES-256-CBC with PKCS7 padding.
//!
//! This module provides:
//! - [`encrypt`] / [`decrypt`]: whole-buffer helpers
//! - [`CbcWriter`]: a [`Write`] adapter that encrypts everything written through it
//! - [`CbcReader`]: a [`Read`] adapter that decrypts and strips padding at end of stream
//!
//! # Compatibility
//!
//! CBC without a MAC is kept because every existing container uses it. A
//! padding failure is reported as [`io::ErrorKind::InvalidData`] wrapping
//! [`CryptoError::Decryption`] and nothing else, so callers can fold it into
//! a single "wrong secret" outcome.

use std::io::{self, Read, Write};

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;

/// AES block length in bytes.
pub const BLOCK_LEN: usize = 16;

/// CBC initialization vector length in bytes.
pub const IV_LEN: usize = BLOCK_LEN;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Ciphertext is pulled from the inner reader in chunks of this size.
const READ_CHUNK: usize = 8192;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Generate a random IV from the OS CSPRNG.
#[must_use]
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Generate a random AES-256 key from the OS CSPRNG.
#[must_use]
pub fn generate_key() -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    key
}

// ---------------------------------------------------------------------------
// Block helpers
// ---------------------------------------------------------------------------

fn xor_in_place(block: &mut [u8; BLOCK_LEN], other: &[u8; BLOCK_LEN]) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

fn encrypt_block(cipher: &Aes256, prev: &mut [u8; BLOCK_LEN], block: &mut [u8; BLOCK_LEN]) {
    xor_in_place(block, prev);
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
    *prev = *block;
}

fn decrypt_block(cipher: &Aes256, prev: &mut [u8; BLOCK_LEN], ct: &[u8]) -> [u8; BLOCK_LEN] {
    let mut saved = [0u8; BLOCK_LEN];
    saved.copy_from_slice(ct);
    let mut block = saved;
    cipher.decrypt_block(GenericArray::from_mut_slice(&mut block));
    xor_in_place(&mut block, prev);
    *prev = saved;
    block
}

/// Length of the plaintext inside a padded final block, or `None` if the
/// PKCS7 padding is invalid.
#[allow(clippy::arithmetic_side_effects)]
fn unpadded_len(block: &[u8; BLOCK_LEN]) -> Option<usize> {
    let pad = usize::from(block[BLOCK_LEN - 1]);
    if pad == 0 || pad > BLOCK_LEN {
        return None;
    }
    let start = BLOCK_LEN - pad;
    let mismatch = block[start..]
        .iter()
        .fold(0u8, |acc, &b| acc | (b ^ block[BLOCK_LEN - 1]));
    (mismatch == 0).then_some(start)
}

fn padding_error() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, CryptoError::Decryption)
}

fn new_cipher(key: &[u8; KEY_LEN]) -> Aes256 {
    Aes256::new(GenericArray::from_slice(key))
}

// ---------------------------------------------------------------------------
// Streaming encryption
// ---------------------------------------------------------------------------

/// Encrypting [`Write`] adapter.
///
/// Bytes written are buffered until a whole block is available, encrypted
/// and forwarded to the inner writer. [`CbcWriter::finish`] must be called
/// to emit the final padded block; dropping the writer without finishing
/// produces a truncated ciphertext.
pub struct CbcWriter<W: Write> {
    inner: Option<W>,
    cipher: Aes256,
    prev: [u8; BLOCK_LEN],
    pending: [u8; BLOCK_LEN],
    pending_len: usize,
    scratch: Vec<u8>,
    poisoned: bool,
}

impl<W: Write> CbcWriter<W> {
    /// Wrap `inner`, encrypting with `key` and `iv`.
    ///
    /// The IV is not written; container formats store it themselves.
    pub fn new(inner: W, key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner: Some(inner),
            cipher: new_cipher(key),
            prev: *iv,
            pending: [0u8; BLOCK_LEN],
            pending_len: 0,
            scratch: Vec::with_capacity(READ_CHUNK),
            poisoned: false,
        }
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        if self.poisoned {
            return Err(io::Error::other("cipher stream poisoned by an earlier error"));
        }
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("cipher stream already finished"))
    }

    fn emit_scratch(&mut self) -> io::Result<()> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.inner_mut().and_then(|w| w.write_all(&scratch));
        scratch.clear();
        self.scratch = scratch;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Pad and encrypt the final block, flush, and return the inner writer.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the inner writer, including one recorded
    /// by an earlier `write` call.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finish(mut self) -> io::Result<W> {
        let pad = BLOCK_LEN.saturating_sub(self.pending_len);
        self.pending[self.pending_len..].fill(pad as u8);
        let mut block = self.pending;
        encrypt_block(&self.cipher, &mut self.prev, &mut block);
        self.scratch.extend_from_slice(&block);
        self.pending.zeroize();
        self.pending_len = 0;
        self.emit_scratch()?;

        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| io::Error::other("cipher stream already finished"))?;
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for CbcWriter<W> {
    #[allow(clippy::arithmetic_side_effects)]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner_mut()?;
        let mut rest = buf;
        while !rest.is_empty() {
            let take = (BLOCK_LEN - self.pending_len).min(rest.len());
            let end = self.pending_len.saturating_add(take);
            self.pending[self.pending_len..end].copy_from_slice(&rest[..take]);
            self.pending_len = end;
            rest = &rest[take..];

            if self.pending_len == BLOCK_LEN {
                let mut block = self.pending;
                encrypt_block(&self.cipher, &mut self.prev, &mut block);
                self.scratch.extend_from_slice(&block);
                self.pending_len = 0;
                if self.scratch.len() >= READ_CHUNK {
                    self.emit_scratch()?;
                }
            }
        }
        self.emit_scratch()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_scratch()?;
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for CbcWriter<W> {
    fn drop(&mut self) {
        self.pending.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Streaming decryption
// ---------------------------------------------------------------------------

/// Decrypting [`Read`] adapter.
///
/// The most recently decrypted block is held back until the inner reader
/// reports end of stream, at which point its PKCS7 padding is verified and
/// stripped. A ciphertext that is empty or not a whole number of blocks,
/// or whose padding is invalid, yields [`io::ErrorKind::InvalidData`].
pub struct CbcReader<R: Read> {
    inner: R,
    cipher: Aes256,
    prev: [u8; BLOCK_LEN],
    raw: Vec<u8>,
    plain: Vec<u8>,
    pos: usize,
    held: Option<[u8; BLOCK_LEN]>,
    eof: bool,
    poisoned: bool,
}

impl<R: Read> CbcReader<R> {
    /// Wrap `inner`, decrypting with `key` and `iv`.
    pub fn new(inner: R, key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner,
            cipher: new_cipher(key),
            prev: *iv,
            raw: Vec::with_capacity(READ_CHUNK),
            plain: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            held: None,
            eof: false,
            poisoned: false,
        }
    }

    /// Pull the next chunk of ciphertext and decrypt every whole block in it.
    #[allow(clippy::arithmetic_side_effects)]
    fn fill(&mut self) -> io::Result<()> {
        self.plain.zeroize();
        self.plain.clear();
        self.pos = 0;

        let carried = self.raw.len();
        self.raw.resize(READ_CHUNK, 0);
        let read = loop {
            match self.inner.read(&mut self.raw[carried..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.raw.truncate(carried);
                    return Err(e);
                }
            }
        };
        self.raw.truncate(carried + read);

        if read == 0 {
            return self.finish_stream();
        }

        let whole = self.raw.len() - self.raw.len() % BLOCK_LEN;
        for ct in self.raw[..whole].chunks_exact(BLOCK_LEN) {
            if let Some(block) = self.held.take() {
                self.plain.extend_from_slice(&block);
            }
            self.held = Some(decrypt_block(&self.cipher, &mut self.prev, ct));
        }
        self.raw.drain(..whole);
        Ok(())
    }

    fn finish_stream(&mut self) -> io::Result<()> {
        self.eof = true;
        if !self.raw.is_empty() {
            return Err(padding_error());
        }
        let Some(mut last) = self.held.take() else {
            return Err(padding_error());
        };
        let result = match unpadded_len(&last) {
            Some(len) => {
                self.plain.extend_from_slice(&last[..len]);
                Ok(())
            }
            None => Err(padding_error()),
        };
        last.zeroize();
        result
    }
}

impl<R: Read> Read for CbcReader<R> {
    #[allow(clippy::arithmetic_side_effects)]
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(padding_error());
        }
        loop {
            if self.pos < self.plain.len() {
                let n = (self.plain.len() - self.pos).min(out.len());
                let end = self.pos.saturating_add(n);
                out[..n].copy_from_slice(&self.plain[self.pos..end]);
                self.pos = end;
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }
            if let Err(e) = self.fill() {
                if e.kind() == io::ErrorKind::InvalidData {
                    self.poisoned = true;
                }
                return Err(e);
            }
        }
    }
}

impl<R: Read> Drop for CbcReader<R> {
    fn drop(&mut self) {
        self.plain.zeroize();
        if let Some(block) = self.held.as_mut() {
            block.zeroize();
        }
    }
}

// ---------------------------------------------------------------------------
// Whole-buffer helpers
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` in one shot. Output is `ceil((len + 1) / 16) * 16` bytes.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] only if the in-memory sink fails,
/// which does not happen in practice.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let capacity = plaintext.len().saturating_add(BLOCK_LEN);
    let mut writer = CbcWriter::new(Vec::with_capacity(capacity), key, iv);
    writer
        .write_all(plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    writer
        .finish()
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypt `ciphertext` in one shot.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the ciphertext is empty, not a
/// whole number of blocks, or carries invalid padding.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut reader = CbcReader::new(ciphertext, key, iv);
    let mut out = Zeroizing::new(Vec::with_capacity(ciphertext.len()));
    reader
        .read_to_end(&mut out)
        .map_err(|_| CryptoError::Decryption)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use data_encoding::HEXLOWER;

    /// Fixed key for tests: 32 bytes of 0xAA.
    const TEST_KEY: [u8; KEY_LEN] = [0xAA; KEY_LEN];

    /// Fixed IV for tests: 16 bytes of 0x01.
    const TEST_IV: [u8; IV_LEN] = [0x01; IV_LEN];

    fn hex(s: &str) -> Vec<u8> {
        HEXLOWER.decode(s.as_bytes()).unwrap()
    }

    #[test]
    fn nist_sp800_38a_cbc_aes256_first_block() {
        // F.2.5 CBC-AES256.Encrypt, block #1. PKCS7 adds a second block.
        let key: [u8; KEY_LEN] =
            hex("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4")
                .try_into()
                .unwrap();
        let iv: [u8; IV_LEN] = hex("000102030405060708090a0b0c0d0e0f").try_into().unwrap();
        let pt = hex("6bc1bee22e409f96e93d7e117393172a");

        let ct = encrypt(&pt, &key, &iv).unwrap();
        assert_eq!(ct.len(), 32);
        assert_eq!(HEXLOWER.encode(&ct[..16]), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");

        let back = decrypt(&ct, &key, &iv).unwrap();
        assert_eq!(back.as_slice(), pt.as_slice());
    }

    #[test]
    fn empty_plaintext_is_one_padding_block() {
        let ct = encrypt(b"", &TEST_KEY, &TEST_IV).unwrap();
        assert_eq!(ct.len(), BLOCK_LEN);
        assert!(decrypt(&ct, &TEST_KEY, &TEST_IV).unwrap().is_empty());
    }

    #[test]
    fn ciphertext_length_rounds_up() {
        for len in [1usize, 15, 16, 17, 31, 32, 100] {
            let ct = encrypt(&vec![0x42; len], &TEST_KEY, &TEST_IV).unwrap();
            assert_eq!(ct.len(), (len / BLOCK_LEN + 1) * BLOCK_LEN, "len {len}");
        }
    }

    #[test]
    fn roundtrip_various_lengths() {
        for len in [0usize, 1, 15, 16, 17, 8191, 8192, 8193, 20_000] {
            let pt: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let ct = encrypt(&pt, &TEST_KEY, &TEST_IV).unwrap();
            let back = decrypt(&ct, &TEST_KEY, &TEST_IV).unwrap();
            assert_eq!(back.as_slice(), pt.as_slice(), "len {len}");
        }
    }

    #[test]
    fn empty_ciphertext_rejected() {
        assert!(matches!(
            decrypt(&[], &TEST_KEY, &TEST_IV),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn partial_block_rejected() {
        let mut ct = encrypt(b"hello world", &TEST_KEY, &TEST_IV).unwrap();
        ct.pop();
        assert!(matches!(
            decrypt(&ct, &TEST_KEY, &TEST_IV),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn wrong_key_fails_or_differs() {
        let pt = b"the quick brown fox jumps over the lazy dog";
        let ct = encrypt(pt, &TEST_KEY, &TEST_IV).unwrap();
        match decrypt(&ct, &[0xBB; KEY_LEN], &TEST_IV) {
            Err(CryptoError::Decryption) => {}
            Ok(out) => assert_ne!(out.as_slice(), pt.as_slice()),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bad_padding_byte_is_invalid_data() {
        // Flip the last ciphertext byte's partner in the previous block so the
        // final plaintext byte becomes 0x00 (never a valid pad).
        let ct = encrypt(&[0u8; 16], &TEST_KEY, &TEST_IV).unwrap();
        let mut tampered = ct.clone();
        tampered[15] ^= 0x10;
        let mut reader = CbcReader::new(tampered.as_slice(), &TEST_KEY, &TEST_IV);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn reader_stays_poisoned_after_error() {
        let mut reader = CbcReader::new(&[0u8; 5][..], &TEST_KEY, &TEST_IV);
        let mut out = [0u8; 32];
        assert!(reader.read(&mut out).is_err());
        assert!(reader.read(&mut out).is_err());
    }

    #[test]
    fn writer_accepts_tiny_writes() {
        let pt: Vec<u8> = (0..=255u8).collect();
        let mut writer = CbcWriter::new(Vec::new(), &TEST_KEY, &TEST_IV);
        for b in &pt {
            writer.write_all(std::slice::from_ref(b)).unwrap();
        }
        let ct = writer.finish().unwrap();
        assert_eq!(ct, encrypt(&pt, &TEST_KEY, &TEST_IV).unwrap());
    }

    #[test]
    fn reader_serves_tiny_reads() {
        let pt: Vec<u8> = (0..1000).map(|i| (i % 7) as u8).collect();
        let ct = encrypt(&pt, &TEST_KEY, &TEST_IV).unwrap();
        let mut reader = CbcReader::new(ct.as_slice(), &TEST_KEY, &TEST_IV);
        let mut out = Vec::new();
        let mut byte = [0u8; 3];
        loop {
            let n = reader.read(&mut byte).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&byte[..n]);
        }
        assert_eq!(out, pt);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_surfaces_inner_error_on_finish() {
        let mut writer = CbcWriter::new(FailingSink, &TEST_KEY, &TEST_IV);
        writer.write_all(&[1u8; 4]).unwrap();
        let err = writer.finish().err().unwrap();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn generated_ivs_and_keys_differ() {
        assert_ne!(generate_iv(), generate_iv());
        assert_ne!(*generate_key(), *generate_key());
    }
}
