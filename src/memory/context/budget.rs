//! Token estimation and budget helpers.

use serde::{Deserialize, Serialize};

use crate::memory::core::config::ContextConfig;

/// Bytes per estimated token.
pub const BYTES_PER_TOKEN: usize = 4;

/// Token budgets for the two bounded sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Budget for the documentation section.
    pub doc_tokens: usize,
    /// Budget for the memory section.
    pub memory_tokens: usize,
}

impl From<&ContextConfig> for ContextBudget {
    fn from(config: &ContextConfig) -> Self {
        Self {
            doc_tokens: config.doc_tokens,
            memory_tokens: config.memory_tokens,
        }
    }
}

/// Estimate tokens as `ceil(bytes / 4)`.
#[must_use]
pub const fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

/// Longest prefix of `text` that is at most `max_bytes` long and ends on a char boundary.
#[must_use]
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
