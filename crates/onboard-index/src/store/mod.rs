//! Vector storage backends.
//!
//! A store holds exactly one corpus generation at a time. `replace_all`
//! swaps the whole corpus; until it returns successfully, searches keep
//! seeing the previous generation.

pub mod any;
pub mod memory;
pub mod qdrant;

use std::future::Future;

use crate::chunk::{Chunk, EmbeddedChunk};
use crate::error::StoreError;

pub use any::AnyStore;
pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

/// A stored chunk and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub trait VectorStore: Send + Sync {
    /// Replace the whole corpus and return the new generation number.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write; the previous
    /// generation stays active in that case.
    fn replace_all(
        &self,
        entries: Vec<EmbeddedChunk>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Up to `limit` entries most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ScoredChunk>, StoreError>> + Send;

    /// Number of entries in the active generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    fn len(&self) -> impl Future<Output = Result<usize, StoreError>> + Send;

    fn name(&self) -> &'static str;
}

/// Cosine similarity; zero when either vector has no magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
