//! Answer model returned by every query, including failed ones.

use onboard_index::{Chunk, ChunkId};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, QueryError};

/// Fixed reply when retrieval produced nothing to ground an answer on.
pub const NO_RELEVANT_CODE: &str = "No relevant code was found in the indexed repository for this question.";

/// A cited location in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content_preview: String,
}

impl SourceReference {
    /// Reference to lines `start..=end` of `chunk`, previewing at most
    /// `preview_chars` characters of those lines.
    #[must_use]
    pub fn from_chunk(chunk: &Chunk, start: usize, end: usize, preview_chars: usize) -> Self {
        let text = chunk
            .slice_lines(start, end)
            .unwrap_or_else(|| chunk.content.clone());
        Self {
            chunk_id: chunk.id.clone(),
            file_path: chunk.file_path.clone(),
            start_line: start,
            end_line: end,
            content_preview: preview(&text, preview_chars),
        }
    }

    /// `path:start-end`, the form the model is asked to cite.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceReference>,
    /// In `[0, 1]`; zero for failures and empty retrievals.
    pub confidence: f32,
    pub processing_time_ms: u64,
    /// Citations removed from the text because no supplied chunk backs them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unverified_citations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AnswerError>,
}

impl Answer {
    #[must_use]
    pub fn no_relevant_code(processing_time_ms: u64) -> Self {
        Self {
            answer: NO_RELEVANT_CODE.to_owned(),
            sources: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            unverified_citations: Vec::new(),
            error: None,
        }
    }

    /// Wrap a query failure so callers always receive an answer-shaped reply.
    #[must_use]
    pub fn from_error(err: &QueryError, processing_time_ms: u64) -> Self {
        let kind = err.kind();
        let answer = match kind {
            ErrorKind::Validation => format!("Cannot answer: {err}."),
            ErrorKind::TransientProvider => {
                format!("The language service is temporarily unavailable ({err}). Please try again.")
            }
            _ => format!("Sorry, the question could not be answered: {err}."),
        };
        Self {
            answer,
            sources: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            unverified_citations: Vec::new(),
            error: Some(AnswerError {
                kind,
                message: err.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}
