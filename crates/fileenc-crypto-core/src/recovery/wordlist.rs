//! Recovery phrase word list.
//!
//! The list is embedded at compile time via `include_str!` and parsed once
//! on first access using `OnceLock`. Order matters only for display and
//! suggestions; membership is what validation checks.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Lower bound on the list size. Twelve draws from 300 words give ~98 bits.
pub const MIN_WORDLIST_SIZE: usize = 300;

const SPANISH_RAW: &str = include_str!("wordlist.txt");

static WORDS: OnceLock<Box<[&'static str]>> = OnceLock::new();
static WORD_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn parse_wordlist(raw: &'static str) -> Box<[&'static str]> {
    let words: Vec<&'static str> = raw
        .lines()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .collect();
    debug_assert!(
        words.len() >= MIN_WORDLIST_SIZE,
        "recovery wordlist must contain at least {MIN_WORDLIST_SIZE} words, got {}",
        words.len()
    );
    words.into_boxed_slice()
}

/// The ordered recovery word list.
#[must_use]
pub fn wordlist() -> &'static [&'static str] {
    WORDS.get_or_init(|| parse_wordlist(SPANISH_RAW))
}

/// Whether `word` appears verbatim in the list.
#[must_use]
pub fn contains(word: &str) -> bool {
    WORD_SET
        .get_or_init(|| wordlist().iter().copied().collect())
        .contains(word)
}

/// Position of `word` in the list, if present.
#[must_use]
pub fn word_index(word: &str) -> Option<usize> {
    wordlist().iter().position(|w| *w == word)
}

/// Up to `max` words starting with `prefix` (lower-cased), in list order.
#[must_use]
pub fn suggest_words(prefix: &str, max: usize) -> Vec<&'static str> {
    let prefix = prefix.trim().to_lowercase();
    wordlist()
        .iter()
        .filter(|w| w.starts_with(prefix.as_str()))
        .take(max)
        .copied()
        .collect()
}
