//! In-process store with brute-force cosine search.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{ScoredChunk, VectorStore, cosine_similarity};
use crate::chunk::EmbeddedChunk;
use crate::error::StoreError;

/// Copy-on-write snapshot store: a write builds a new vector and swaps the
/// `Arc`, so readers holding the old snapshot are never disturbed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: RwLock<Arc<Vec<EmbeddedChunk>>>,
    generation: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Vec<EmbeddedChunk>> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl VectorStore for MemoryStore {
    async fn replace_all(&self, entries: Vec<EmbeddedChunk>) -> Result<u64, StoreError> {
        let fresh = Arc::new(entries);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let snapshot = self.current();
        let mut scored: Vec<(f32, &EmbeddedChunk)> = snapshot
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.chunk.id.cmp(&b.1.chunk.id))
        });
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.current().len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::chunk::{Chunk, ChunkId, ChunkKind};
    use crate::languages::Lang;

    fn entry(path: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: ChunkId::derive(path, 1, 1, 0),
                file_path: path.to_owned(),
                content: format!("// {path}\n"),
                start_line: 1,
                end_line: 1,
                overlap_lines: 0,
                language: Lang::Rust,
                kind: ChunkKind::Module,
                name: None,
                metadata: BTreeMap::new(),
                content_hash: String::new(),
            },
            vector,
            model: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_store_returns_nothing() {
        let store = MemoryStore::new();
        assert!(store.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = MemoryStore::new();
        store
            .replace_all(vec![
                entry("far.rs", vec![0.0, 1.0]),
                entry("near.rs", vec![1.0, 0.1]),
                entry("mid.rs", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.chunk.file_path.as_str()).collect();
        assert_eq!(paths, vec!["near.rs", "mid.rs"]);
    }

    #[tokio::test]
    async fn replace_all_swaps_generation() {
        let store = MemoryStore::new();
        let g1 = store
            .replace_all(vec![entry("old.rs", vec![1.0])])
            .await
            .unwrap();
        let g2 = store
            .replace_all(vec![entry("new.rs", vec![1.0]), entry("new2.rs", vec![1.0])])
            .await
            .unwrap();
        assert!(g2 > g1);
        assert_eq!(store.len().await.unwrap(), 2);
        let hits = store.search(&[1.0], 10).await.unwrap();
        assert!(hits.iter().all(|h| h.chunk.file_path.starts_with("new")));
    }

    #[tokio::test]
    async fn reader_snapshot_survives_replacement() {
        let store = MemoryStore::new();
        store
            .replace_all(vec![entry("a.rs", vec![1.0])])
            .await
            .unwrap();
        let held = store.current();
        store.replace_all(Vec::new()).await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
