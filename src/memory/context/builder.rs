//! Context assembly for the calling agent.
//!
//! Output layout, each section omitted when empty:
//!
//! ```text
//! [DOCUMENTATION]
//! <doc blob, truncated>
//! [MEMORY_RELEVANT]
//! * (decision) <content> [keywords: a, b] [relevance: 0.87]
//! [CURRENT_FILE]
//! <file context, truncated to the leftover budget>
//! ```

use serde::Serialize;

use crate::memory::context::budget::{
    BYTES_PER_TOKEN, ContextBudget, estimate_tokens, truncate_to_bytes,
};
use crate::memory::core::ids::MemoryId;
use crate::memory::retrieval::hybrid_search::SearchHit;

const DOC_HEADER: &str = "[DOCUMENTATION]\n";
const MEMORY_HEADER: &str = "[MEMORY_RELEVANT]\n";
const FILE_HEADER: &str = "[CURRENT_FILE]\n";

/// Assembled context with accounting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    /// Rendered text.
    pub text: String,
    /// Estimated tokens of `text`.
    pub tokens: usize,
    /// Tokens spent on the documentation section.
    pub doc_tokens: usize,
    /// Tokens spent on the memory section.
    pub memory_tokens: usize,
    /// Tokens spent on the current-file section.
    pub file_tokens: usize,
    /// Records rendered, in rank order.
    pub included: Vec<MemoryId>,
    /// Records that did not fit.
    pub skipped: Vec<MemoryId>,
}

/// Render one memory entry line.
#[must_use]
pub fn render_memory_entry(hit: &SearchHit) -> String {
    let record = &hit.record;
    let mut out = String::with_capacity(record.content.len() + 48);
    out.push_str("* ");
    out.push_str(record.content_type.context_tag());
    out.push(' ');
    out.push_str(&record.content);
    if !record.keywords.is_empty() {
        out.push_str(" [keywords: ");
        out.push_str(
            &record
                .keywords
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push(']');
    }
    out.push_str(&format!(" [relevance: {:.2}]\n", hit.relevance));
    out
}

/// Section holding as much of `body` as fits in `tokens`, or nothing.
fn truncated_section(header: &str, body: &str, tokens: usize) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let available = tokens
        .saturating_mul(BYTES_PER_TOKEN)
        .checked_sub(header.len() + 1)?;
    let kept = truncate_to_bytes(body, available).trim_end();
    if kept.is_empty() {
        return None;
    }
    let mut section = String::with_capacity(header.len() + kept.len() + 1);
    section.push_str(header);
    section.push_str(kept);
    section.push('\n');
    Some(section)
}

/// Assemble documentation, ranked memories and the current file within the budgets.
///
/// Memory entries are added whole in rank order while they fit; an entry that does not fit is
/// skipped and later, smaller entries may still be added. The current-file section gets
/// whatever the other two sections left unused.
#[must_use]
pub fn assemble(
    doc_blob: &str,
    hits: &[SearchHit],
    budget: ContextBudget,
    current_file: Option<&str>,
) -> AssembledContext {
    let mut context = AssembledContext::default();

    if let Some(section) = truncated_section(DOC_HEADER, doc_blob, budget.doc_tokens) {
        context.doc_tokens = estimate_tokens(&section);
        context.text.push_str(&section);
    }

    let mut memory = String::from(MEMORY_HEADER);
    for hit in hits {
        let entry = render_memory_entry(hit);
        if estimate_tokens(&memory) + estimate_tokens(&entry) <= budget.memory_tokens {
            memory.push_str(&entry);
            context.included.push(hit.record.id);
        } else {
            context.skipped.push(hit.record.id);
        }
    }
    if !context.included.is_empty() {
        context.memory_tokens = estimate_tokens(&memory);
        context.text.push_str(&memory);
    }

    if let Some(file) = current_file {
        let leftover = (budget.doc_tokens - context.doc_tokens)
            + (budget.memory_tokens - context.memory_tokens);
        if let Some(section) = truncated_section(FILE_HEADER, file, leftover) {
            context.file_tokens = estimate_tokens(&section);
            context.text.push_str(&section);
        }
    }

    context.tokens = estimate_tokens(&context.text);
    context
}
