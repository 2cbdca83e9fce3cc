//! BIP-39 mnemonic gate for Shelley wallet derivation
//!
//! Phrases are normalised, checked against the English word list and the
//! checksum, and only then converted to entropy. Entropy never leaves a
//! `Zeroizing` buffer.

use bip39::{Language, Mnemonic};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Word counts a wallet set may use.
pub const ACCEPTED_WORD_COUNTS: [usize; 2] = [15, 24];

#[derive(Debug, Error)]
pub enum MnemonicError {
    #[error("No mnemonic words supplied")]
    Empty,

    #[error("Invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid word count: {0} (must be 15 or 24)")]
    InvalidWordCount(usize),
}

/// Lower-case every word and join with single spaces.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse(phrase: &str) -> Result<Mnemonic, MnemonicError> {
    let normalized = Zeroizing::new(normalize_phrase(phrase));
    if normalized.is_empty() {
        return Err(MnemonicError::Empty);
    }

    let word_count = normalized.split(' ').count();
    if !ACCEPTED_WORD_COUNTS.contains(&word_count) {
        return Err(MnemonicError::InvalidWordCount(word_count));
    }

    Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| MnemonicError::InvalidMnemonic(e.to_string()))
}

/// Generate a new random mnemonic phrase with the specified number of words.
pub fn generate_mnemonic(word_count: usize) -> Result<MnemonicPhrase, MnemonicError> {
    if !ACCEPTED_WORD_COUNTS.contains(&word_count) {
        return Err(MnemonicError::InvalidWordCount(word_count));
    }

    let mnemonic = Mnemonic::generate_in(Language::English, word_count)
        .map_err(|e| MnemonicError::InvalidMnemonic(e.to_string()))?;

    Ok(MnemonicPhrase {
        phrase: Zeroizing::new(mnemonic.to_string()),
    })
}

/// Validate a mnemonic phrase (word count, word list and checksum).
pub fn validate_mnemonic(phrase: &str) -> Result<(), MnemonicError> {
    parse(phrase).map(|_| ())
}

/// Check if a single word is in the BIP-39 English wordlist.
pub fn is_valid_bip39_word(word: &str) -> bool {
    Language::English.find_word(&word.to_lowercase()).is_some()
}

/// Convert a validated phrase to its raw entropy bytes.
pub fn mnemonic_to_entropy(phrase: &str) -> Result<Zeroizing<Vec<u8>>, MnemonicError> {
    let mnemonic = parse(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_entropy()))
}

/// A phrase that has passed validation.
#[derive(Clone)]
pub struct MnemonicPhrase {
    phrase: Zeroizing<String>,
}

impl MnemonicPhrase {
    pub fn generate(word_count: usize) -> Result<Self, MnemonicError> {
        generate_mnemonic(word_count)
    }

    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        validate_mnemonic(phrase)?;
        Ok(Self {
            phrase: Zeroizing::new(normalize_phrase(phrase)),
        })
    }

    /// Build a phrase from individually entered words.
    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Result<Self, MnemonicError> {
        let joined = Zeroizing::new(
            words
                .iter()
                .map(|w| w.as_ref().trim())
                .collect::<Vec<_>>()
                .join(" "),
        );
        Self::from_phrase(&joined)
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').count()
    }

    pub fn to_entropy(&self) -> Result<Zeroizing<Vec<u8>>, MnemonicError> {
        mnemonic_to_entropy(&self.phrase)
    }
}

impl fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MnemonicPhrase({} words, redacted)", self.word_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE_24: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon art";
    const PHRASE_15: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon abandon address";

    #[test]
    fn test_generate_mnemonic_15_words() {
        let phrase = generate_mnemonic(15).unwrap();
        assert_eq!(phrase.word_count(), 15);
        assert!(validate_mnemonic(phrase.phrase()).is_ok());
    }

    #[test]
    fn test_generate_mnemonic_24_words() {
        let phrase = generate_mnemonic(24).unwrap();
        assert_eq!(phrase.word_count(), 24);
    }

    #[test]
    fn test_invalid_word_count() {
        match generate_mnemonic(12) {
            Err(MnemonicError::InvalidWordCount(12)) => {}
            other => panic!("Expected InvalidWordCount error, got {:?}", other.map(|_| ())),
        }

        let twelve = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        assert!(matches!(
            validate_mnemonic(twelve),
            Err(MnemonicError::InvalidWordCount(12))
        ));
    }

    #[test]
    fn test_empty_mnemonic() {
        assert!(matches!(validate_mnemonic(""), Err(MnemonicError::Empty)));
        assert!(matches!(validate_mnemonic("   \n\t "), Err(MnemonicError::Empty)));
    }

    #[test]
    fn test_invalid_checksum_rejected() {
        // last word changed from "art" to "zoo"
        let bad = PHRASE_24.replace(" art", " zoo");
        assert!(matches!(
            validate_mnemonic(&bad),
            Err(MnemonicError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_unknown_word_rejected() {
        let bad = PHRASE_15.replace("address", "notaword");
        assert!(matches!(
            validate_mnemonic(&bad),
            Err(MnemonicError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_entropy_length_follows_word_count() {
        assert_eq!(mnemonic_to_entropy(PHRASE_15).unwrap().len(), 20);
        assert_eq!(mnemonic_to_entropy(PHRASE_24).unwrap().len(), 32);
        assert!(mnemonic_to_entropy(PHRASE_24).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_phrase_is_normalised() {
        let messy = format!("  {}  ", PHRASE_15.to_uppercase().replace(' ', "   "));
        let phrase = MnemonicPhrase::from_phrase(&messy).unwrap();
        assert_eq!(phrase.phrase(), normalize_phrase(PHRASE_15));
    }

    #[test]
    fn test_from_words() {
        let words: Vec<&str> = PHRASE_15.split_whitespace().collect();
        let phrase = MnemonicPhrase::from_words(&words).unwrap();
        assert_eq!(phrase.word_count(), 15);
    }

    #[test]
    fn test_debug_is_redacted() {
        let phrase = MnemonicPhrase::from_phrase(PHRASE_15).unwrap();
        let debug = format!("{:?}", phrase);
        assert!(!debug.contains("abandon"));
    }

    #[test]
    fn test_is_valid_bip39_word() {
        assert!(is_valid_bip39_word("abandon"));
        assert!(is_valid_bip39_word("Zoo"));
        assert!(!is_valid_bip39_word("cardano"));
    }
}
