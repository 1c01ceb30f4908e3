//! Error types for onboard-index.

use onboard_llm::LlmError;

/// Boundary detection failed; the file degrades to fixed-size windows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("no boundary detector for {0}")]
    Unsupported(&'static str),

    #[error("grammar for {0} is not compiled in")]
    GrammarMissing(&'static str),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("syntax tree is malformed and contains no constructs")]
    Malformed,

    #[error("unbalanced braces near line {line}")]
    Unbalanced { line: usize },
}

impl StructuralError {
    /// Short tag recorded as `fallback_reason` on fallback chunks.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported_language",
            Self::GrammarMissing(_) => "grammar_missing",
            Self::NoTree => "no_tree",
            Self::Malformed => "malformed_syntax",
            Self::Unbalanced { .. } => "unbalanced_braces",
        }
    }
}

/// Embedding failures surfaced by the vectorizer.
#[derive(Debug, thiserror::Error)]
pub enum VectorizeError {
    /// A batch gave up after the retry policy was exhausted.
    #[error("embedding batch {batch} ({size} texts) failed after {attempts} attempt(s): {source}")]
    Batch {
        batch: usize,
        size: usize,
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("provider returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider {0} has no embedding model configured")]
    Unsupported(String),
}

impl VectorizeError {
    /// Whether the failure stems from configuration rather than the provider
    /// being temporarily unavailable.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::Unsupported(_)
        ) || matches!(
            self,
            Self::Batch { source: LlmError::EmbedUnsupported { .. }, .. }
        )
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Batch { source, .. } if source.is_transient())
    }
}

/// Vector store backend failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid payload for point {point}: missing or malformed `{field}`")]
    InvalidPayload { point: String, field: &'static str },

    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl From<qdrant_client::QdrantError> for StoreError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Self::Qdrant(Box::new(err))
    }
}

/// Errors returned by [`crate::Index`].
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("another corpus write is already in progress")]
    WriteInProgress,

    #[error("vector for {subject} has dimension {actual}, index expects {expected}")]
    DimensionMismatch {
        subject: String,
        expected: usize,
        actual: usize,
    },

    #[error("vector for {subject} contains a non-finite component at position {position}")]
    NonFiniteVector { subject: String, position: usize },
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
