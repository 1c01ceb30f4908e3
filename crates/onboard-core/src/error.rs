//! Error types for onboard-core and their mapping onto user-facing kinds.

use std::path::PathBuf;
use std::time::Duration;

use onboard_index::{IndexError, VectorizeError};
use onboard_llm::LlmError;
use serde::{Deserialize, Serialize};

/// Coarse failure classes reported alongside answers and ingestion warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or empty input; never retried.
    Validation,
    /// Rate limit, timeout or network failure that outlived the retry policy.
    TransientProvider,
    /// A file could not be parsed and was windowed instead.
    Structural,
    /// The model cited a location it was not shown.
    GroundingViolation,
    /// Wrong dimension, missing credentials, unsupported provider.
    Configuration,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("no API key configured (set ONBOARD_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("embedding model returns {actual}-dimensional vectors but {expected} are configured")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding provider check failed: {0}")]
    Embedding(#[source] VectorizeError),
}

/// Failures fetching files from a repository.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("repository not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures answering a single question.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("embedding the question failed: {0}")]
    Embed(#[from] VectorizeError),

    #[error("search failed: {0}")]
    Search(#[from] IndexError),

    #[error("language model failed after {attempts} attempt(s): {source}")]
    Generate {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("query exceeded its {0:?} deadline")]
    Timeout(Duration),
}

impl QueryError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuestion => ErrorKind::Validation,
            Self::Embed(e) if e.is_configuration() => ErrorKind::Configuration,
            Self::Embed(e) if e.is_transient() => ErrorKind::TransientProvider,
            Self::Search(IndexError::DimensionMismatch { .. }) => ErrorKind::Configuration,
            Self::Generate { source, .. } if source.is_transient() => ErrorKind::TransientProvider,
            Self::Timeout(_) => ErrorKind::TransientProvider,
            Self::Embed(_) | Self::Search(_) | Self::Generate { .. } => ErrorKind::Internal,
        }
    }
}

/// Failures of a whole ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("an ingestion is already in progress")]
    IngestionInProgress,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("none of the {files} file(s) could be indexed")]
    NothingIndexed { files: usize },

    #[error("index write failed: {0}")]
    Index(#[from] IndexError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IngestionInProgress => ErrorKind::Validation,
            Self::Config(_) | Self::Index(IndexError::DimensionMismatch { .. }) => {
                ErrorKind::Configuration
            }
            Self::Source(_) | Self::NothingIndexed { .. } | Self::Index(_) => ErrorKind::Internal,
        }
    }
}
