//! Contextualized embedding text and display headers.
//!
//! Embedding raw code alone retrieves poorly for conceptual questions.
//! Prepending the file path, symbol and language gives the embedding model
//! something to match "where is auth handled?" against.

use crate::chunk::Chunk;

/// Rough characters-per-token ratio used for every budget in the crate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Generate text optimized for embedding (not for display).
#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.content.len() + 128);

    text.push_str("# ");
    text.push_str(&chunk.file_path);
    text.push('\n');

    if let Some(name) = &chunk.name {
        text.push_str("# Symbol: ");
        text.push_str(name);
        if let Some(parent) = chunk.metadata.get("parent") {
            text.push_str(" in ");
            text.push_str(parent);
        }
        text.push('\n');
    }

    text.push_str("# Language: ");
    text.push_str(chunk.language.id());
    text.push_str(", kind: ");
    text.push_str(chunk.kind.as_str());
    text.push('\n');

    text.push_str(&chunk.content);
    text
}

/// Cut `text` to at most `max_chars` characters, keeping the head.
/// Returns `None` when no cut was needed.
#[must_use]
pub fn truncate_head(text: &str, max_chars: usize) -> Option<&str> {
    text.char_indices().nth(max_chars).map(|(idx, _)| &text[..idx])
}

/// Short header for a chunk in prompts and listings.
#[must_use]
pub fn chunk_display_header(chunk: &Chunk) -> String {
    let location = format!(
        "{}:{}-{}",
        chunk.file_path, chunk.start_line, chunk.end_line
    );
    match &chunk.name {
        Some(name) => format!("{location} ({} {name})", chunk.kind),
        None => format!("{location} ({})", chunk.kind),
    }
}
