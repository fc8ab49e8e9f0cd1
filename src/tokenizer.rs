//! Keyword Tokenizer
//!
//! Turns raw utterances into the keyword lists and pattern keys that the
//! knowledge store groups on. Everything here is a pure function of the text.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Maximum keywords kept per utterance
pub const MAX_KEYWORDS: usize = 5;

/// Keywords that make up a pattern key
pub const PATTERN_KEY_WORDS: usize = 3;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
        "will", "would", "could", "should", "may", "might", "can", "must",
    ]
    .into_iter()
    .collect()
});

/// Canonical, order-independent fingerprint of an utterance's top keywords
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternKey(String);

impl PatternKey {
    /// Build the key from an already extracted keyword list
    pub fn from_keywords(keywords: &[String]) -> Self {
        let mut top: Vec<&str> = keywords
            .iter()
            .take(PATTERN_KEY_WORDS)
            .map(|s| s.as_str())
            .collect();
        top.sort_unstable();
        Self(top.join("_"))
    }

    /// Wrap an existing key string (operator input, persisted data)
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keywords encoded in the key
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.0.split('_').filter(|w| !w.is_empty())
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One incoming turn, folded into other entities and never stored alone
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub keywords: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            keywords: extract_keywords(text),
            timestamp: Utc::now(),
        }
    }

    pub fn pattern_key(&self) -> PatternKey {
        PatternKey::from_keywords(&self.keywords)
    }
}

/// Extract up to [`MAX_KEYWORDS`] meaningful lowercase keywords
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Lowercase whitespace tokens with surrounding punctuation removed
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalized question form: trimmed, lowercased, trailing `?` removed
pub fn normalize_question(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c == '?' || c.is_whitespace())
        .trim()
        .to_lowercase()
}

/// Whether `phrase` occurs in `tokens` on word boundaries
pub fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() || words.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(words.len())
        .any(|w| w.iter().zip(&words).all(|(t, p)| t == p))
}

/// Whether any phrase in the list occurs on word boundaries
pub fn contains_any(tokens: &[String], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(tokens, p))
}
