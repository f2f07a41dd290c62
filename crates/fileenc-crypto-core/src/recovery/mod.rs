//! Twelve-word recovery phrases.
//!
//! A recovery phrase is twelve words drawn uniformly, with replacement,
//! from the embedded [`wordlist`]. The recovery key is
//! `PBKDF2-SHA256(phrase, "FileEncrypterRecovery2024", 100_000)`: the salt is
//! a fixed constant so the key is a pure function of the phrase.
//!
//! Phrases are normalized (trimmed, lower-cased, single-space separated)
//! before derivation. Generated phrases are already in normal form, so this
//! only affects how forgiving we are with typed input.

pub mod wordlist;

use std::fmt;

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};

use crate::error::CryptoError;
use crate::kdf::{self, DerivedKey};

pub use wordlist::{suggest_words, word_index, wordlist, MIN_WORDLIST_SIZE};

/// Number of words in every recovery phrase.
pub const PHRASE_WORD_COUNT: usize = 12;

/// Fixed PBKDF2 salt for recovery keys.
pub const RECOVERY_SALT: &[u8] = b"FileEncrypterRecovery2024";

/// Words per line in [`format_for_display`].
const WORDS_PER_LINE: usize = 4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A validated, normalized recovery phrase.
///
/// The text lives in a [`SecretString`] and `Debug` is masked.
pub struct RecoveryPhrase(SecretString);

impl RecoveryPhrase {
    /// Validate and normalize user input.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RecoveryPhrase`] if the input does not contain
    /// exactly twelve words from the list.
    pub fn parse(input: &str) -> Result<Self, CryptoError> {
        let words = phrase_words(input);
        if words.len() != PHRASE_WORD_COUNT {
            return Err(CryptoError::RecoveryPhrase(format!(
                "expected {PHRASE_WORD_COUNT} words, got {}",
                words.len()
            )));
        }
        if let Some(pos) = words.iter().position(|w| !wordlist::contains(w)) {
            return Err(CryptoError::RecoveryPhrase(format!(
                "word {} is not in the recovery word list",
                pos.saturating_add(1)
            )));
        }
        Ok(Self(SecretString::new(words.join(" ").into_boxed_str())))
    }

    /// The normalized phrase text.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// The twelve words, in order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.expose().split(' ')
    }

    /// Derive the recovery key for this phrase.
    ///
    /// # Errors
    ///
    /// Propagates [`CryptoError::KeyDerivation`]; never fails in practice.
    pub fn derive_key(&self) -> Result<DerivedKey, CryptoError> {
        kdf::derive_key(self.expose().as_bytes(), RECOVERY_SALT)
    }

    /// Numbered, four-per-line rendering for showing to the user.
    #[must_use]
    pub fn format_for_display(&self) -> String {
        format_for_display(self.expose())
    }
}

impl fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryPhrase(***)")
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Generate a fresh phrase and its recovery key.
///
/// Each of the twelve indices is drawn uniformly from `OsRng`; repeated
/// words are allowed.
///
/// # Errors
///
/// Propagates [`CryptoError::KeyDerivation`]; never fails in practice.
pub fn generate() -> Result<(RecoveryPhrase, DerivedKey), CryptoError> {
    let words = wordlist();
    let mut rng = rand::rngs::OsRng;
    let chosen: Vec<&str> = (0..PHRASE_WORD_COUNT)
        .map(|_| words[rng.gen_range(0..words.len())])
        .collect();
    let phrase = RecoveryPhrase(SecretString::new(chosen.join(" ").into_boxed_str()));
    let key = phrase.derive_key()?;
    Ok((phrase, key))
}

/// True iff `phrase`, trimmed and lower-cased, splits into exactly twelve
/// whitespace-separated words that all appear in the list.
#[must_use]
pub fn validate(phrase: &str) -> bool {
    let words = phrase_words(phrase);
    words.len() == PHRASE_WORD_COUNT && words.iter().all(|w| wordlist::contains(w))
}

/// Derive the recovery key from `phrase` after normalizing it.
///
/// Does not check list membership; see [`validate`].
///
/// # Errors
///
/// Propagates [`CryptoError::KeyDerivation`]; never fails in practice.
pub fn derive_key_from_phrase(phrase: &str) -> Result<DerivedKey, CryptoError> {
    let normalized = phrase_words(phrase).join(" ");
    kdf::derive_key(normalized.as_bytes(), RECOVERY_SALT)
}

/// Normalized tokens of `phrase`: trimmed, lower-cased, split on whitespace.
#[must_use]
pub fn phrase_words(phrase: &str) -> Vec<String> {
    phrase
        .trim()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Render `phrase` as ` 1. word   2. word   3. word   4. word` lines.
///
/// Input that is not exactly twelve words is returned unchanged.
#[must_use]
pub fn format_for_display(phrase: &str) -> String {
    let words = phrase_words(phrase);
    if words.len() != PHRASE_WORD_COUNT {
        return phrase.to_owned();
    }

    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        let n = i.saturating_add(1);
        out.push_str(&format!("{n:>2}. {word}"));
        if n < words.len() {
            out.push_str(if n % WORDS_PER_LINE == 0 { "\n" } else { "   " });
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
