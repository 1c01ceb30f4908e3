//! Runtime-selected store backend.

use super::{MemoryStore, QdrantStore, ScoredChunk, VectorStore};
use crate::chunk::EmbeddedChunk;
use crate::error::StoreError;

/// Generates a match over all `AnyStore` variants, binding the inner store.
macro_rules! delegate_store {
    ($self:expr, |$s:ident| $expr:expr) => {
        match $self {
            AnyStore::Memory($s) => $expr,
            AnyStore::Qdrant($s) => $expr,
        }
    };
}

#[derive(Debug)]
pub enum AnyStore {
    Memory(MemoryStore),
    Qdrant(Box<QdrantStore>),
}

impl VectorStore for AnyStore {
    async fn replace_all(&self, entries: Vec<EmbeddedChunk>) -> Result<u64, StoreError> {
        delegate_store!(self, |s| s.replace_all(entries).await)
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        delegate_store!(self, |s| s.search(query, limit).await)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        delegate_store!(self, |s| s.len().await)
    }

    fn name(&self) -> &'static str {
        delegate_store!(self, |s| s.name())
    }
}
