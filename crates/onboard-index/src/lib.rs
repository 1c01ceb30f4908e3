//! Code segmentation, embedding and similarity search.
//!
//! The ingestion path is strictly one-way: a [`SourceFile`] is cut into
//! line-addressed [`Chunk`]s by the [`segmenter`], turned into vectors by the
//! [`vectorizer`], and stored as a whole corpus in an [`index::Index`] backed
//! by any [`store::VectorStore`].

pub mod chunk;
pub mod context;
pub mod error;
pub mod index;
pub mod languages;
pub mod segmenter;
pub mod store;
pub mod vectorizer;

pub use chunk::{Chunk, ChunkId, ChunkKind, EmbeddedChunk, SearchResult, SourceFile};
pub use error::{IndexError, StoreError, StructuralError, VectorizeError};
pub use index::Index;
pub use languages::{Lang, detect_language};
pub use segmenter::{ChunkingConfig, Segmenter};
pub use store::VectorStore;
pub use vectorizer::{Vectorizer, VectorizerConfig};
