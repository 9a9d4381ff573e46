//! Keyword extraction for the full-text index.
//!
//! Identifiers and words are taken from normalised text, stop words and short tokens are
//! dropped, and the most frequent remaining tokens are kept (ties alphabetical).

use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;

use crate::memory::core::config::IngestConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "being", "but", "can", "could", "did", "does", "doing", "each", "else", "for", "from", "had",
    "has", "have", "here", "how", "into", "its", "just", "let", "like", "more", "most", "must",
    "not", "now", "only", "other", "our", "out", "over", "same", "should", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "too",
    "use", "used", "using", "very", "was", "were", "what", "when", "where", "which", "while",
    "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercase, trim and collapse whitespace runs to a single space.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut prev_space = false;

    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !prev_space {
                normalized.push(' ');
                prev_space = true;
            }
        } else {
            normalized.extend(ch.to_lowercase());
            prev_space = false;
        }
    }

    normalized
}

/// Frequency-ranked keyword extractor.
pub struct KeywordExtractor {
    token: Regex,
    stopwords: HashSet<&'static str>,
    max_keywords: usize,
    min_chars: usize,
}

impl KeywordExtractor {
    /// Create an extractor from config.
    ///
    /// # Errors
    /// Returns an error if the token pattern fails to compile.
    pub fn new(config: &IngestConfig) -> MemoryResult<Self> {
        let token = Regex::new(r"[\p{L}_][\p{L}\p{N}_]*")
            .map_err(|err| MemoryError::InvalidConfig(format!("keyword pattern: {err}")))?;
        Ok(Self {
            token,
            stopwords: STOPWORDS.iter().copied().collect(),
            max_keywords: config.max_keywords,
            min_chars: config.min_keyword_chars,
        })
    }

    /// Top keywords of `content`.
    #[must_use]
    pub fn extract(&self, content: &str) -> BTreeSet<String> {
        let normalized = normalize_text(content);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in self.token.find_iter(&normalized).map(|m| m.as_str()) {
            let token = token.trim_matches('_');
            if token.chars().count() < self.min_chars || self.stopwords.contains(token) {
                continue;
            }
            *counts.entry(token).or_default() += 1;
        }

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(token, _)| token.to_string())
            .collect()
    }

    /// Extracted keywords plus caller-supplied ones (normalised, blanks dropped).
    #[must_use]
    pub fn merge(&self, content: &str, supplied: &[String]) -> BTreeSet<String> {
        let mut keywords = self.extract(content);
        keywords.extend(
            supplied
                .iter()
                .map(|keyword| normalize_text(keyword))
                .filter(|keyword| !keyword.is_empty()),
        );
        keywords
    }
}
