//! Grounded question answering over one indexed repository.
//!
//! [`Coordinator`] owns the corpus lifecycle: it pulls files from a
//! [`source::RepositorySource`], runs them through the segmenter, vectorizer
//! and index from `onboard-index`, and answers questions through the
//! [`grounding::Grounder`].

pub mod answer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod grounding;
pub mod source;

pub use answer::{Answer, AnswerError, SourceReference};
pub use config::Config;
pub use coordinator::{Coordinator, CorpusSnapshot, CorpusState, CorpusStatus, FileWarning, IngestReport};
pub use error::{ConfigError, ErrorKind, PipelineError, QueryError, SourceError};
pub use grounding::Grounder;
pub use source::{LocalSource, RepositorySource};
