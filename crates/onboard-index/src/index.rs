//! Corpus-level index over a [`VectorStore`].

use tokio::sync::Mutex;

use crate::chunk::{EmbeddedChunk, SearchResult};
use crate::error::{IndexError, Result};
use crate::store::VectorStore;

/// Single-writer wrapper that validates vectors and ranks results.
///
/// Upserts replace the whole corpus. A second upsert while one is running is
/// rejected with [`IndexError::WriteInProgress`]; searches never wait.
pub struct Index<S> {
    store: S,
    dimension: usize,
    score_threshold: Option<f32>,
    writer: Mutex<()>,
}

impl<S: VectorStore> Index<S> {
    #[must_use]
    pub fn new(store: S, dimension: usize) -> Self {
        Self {
            store,
            dimension,
            score_threshold: None,
            writer: Mutex::new(()),
        }
    }

    /// Drop hits scoring below `threshold`.
    #[must_use]
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Replace the corpus with `entries`; returns the new generation.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::WriteInProgress`] if another upsert holds the
    /// writer, [`IndexError::DimensionMismatch`] or
    /// [`IndexError::NonFiniteVector`] before touching the store if any vector
    /// has the wrong length or holds a NaN or infinity, or the store's error.
    /// On error the previous corpus stays searchable.
    pub async fn upsert(&self, entries: Vec<EmbeddedChunk>) -> Result<u64> {
        let _writer = self.writer.try_lock().map_err(|_| IndexError::WriteInProgress)?;

        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                subject: format!("chunk {}", bad.chunk.id),
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }
        for entry in &entries {
            check_finite(&entry.vector, || format!("chunk {}", entry.chunk.id))?;
        }

        let count = entries.len();
        let generation = self.store.replace_all(entries).await?;
        tracing::info!(store = self.store.name(), entries = count, generation, "corpus replaced");
        Ok(generation)
    }

    /// The `top_k` most similar chunks, best first, ties broken by chunk id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] for a query vector of the
    /// wrong length, [`IndexError::NonFiniteVector`] for one holding a NaN or
    /// infinity, or the store's error.
    pub async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                subject: "query".into(),
                expected: self.dimension,
                actual: query.len(),
            });
        }
        check_finite(query, || "query".to_owned())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self.store.search(query, top_k).await?;
        hits.retain(|hit| hit.score.is_finite());
        if let Some(floor) = self.score_threshold {
            hits.retain(|hit| hit.score >= floor);
        }
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SearchResult {
                chunk: hit.chunk,
                score: hit.score,
                rank: i + 1,
            })
            .collect())
    }

    /// Entries in the active corpus.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.len().await?)
    }

    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

fn check_finite(vector: &[f32], subject: impl FnOnce() -> String) -> Result<()> {
    match vector.iter().position(|x| !x.is_finite()) {
        Some(position) => Err(IndexError::NonFiniteVector {
            subject: subject(),
            position,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;
    use crate::chunk::{Chunk, ChunkId, ChunkKind};
    use crate::error::StoreError;
    use crate::languages::Lang;
    use crate::store::{MemoryStore, ScoredChunk};

    fn entry(path: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: ChunkId::derive(path, 1, 1, 0),
                file_path: path.to_owned(),
                content: "x\n".into(),
                start_line: 1,
                end_line: 1,
                overlap_lines: 0,
                language: Lang::Python,
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

    /// Store whose writes block until released, to observe the writer lock.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl VectorStore for SlowStore {
        async fn replace_all(&self, entries: Vec<EmbeddedChunk>) -> std::result::Result<u64, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.replace_all(entries).await
        }

        async fn search(&self, query: &[f32], limit: usize) -> std::result::Result<Vec<ScoredChunk>, StoreError> {
            self.inner.search(query, limit).await
        }

        async fn len(&self) -> std::result::Result<usize, StoreError> {
            self.inner.len().await
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn empty_index_search_is_empty_not_error() {
        let index = Index::new(MemoryStore::new(), 2);
        assert!(index.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn ties_break_by_chunk_id_and_ranks_start_at_one() {
        let index = Index::new(MemoryStore::new(), 2);
        index
            .upsert(vec![
                entry("b.py", vec![1.0, 0.0]),
                entry("a.py", vec![1.0, 0.0]),
                entry("c.py", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let results = index.search(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].chunk.id < results[1].chunk.id);
        assert_eq!(
            results.iter().map(|r| r.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(results[2].chunk.file_path, "c.py");
    }

    #[tokio::test]
    async fn score_threshold_filters_weak_hits() {
        let index = Index::new(MemoryStore::new(), 2).with_score_threshold(Some(0.5));
        index
            .upsert(vec![
                entry("near.py", vec![1.0, 0.1]),
                entry("far.py", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let results = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_path, "near.py");
    }

    #[tokio::test]
    async fn wrong_dimension_leaves_corpus_untouched() {
        let index = Index::new(MemoryStore::new(), 2);
        index.upsert(vec![entry("keep.py", vec![1.0, 0.0])]).await.unwrap();
        let err = index
            .upsert(vec![entry("bad.py", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 3, .. }));
        let results = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.file_path, "keep.py");

        assert!(matches!(
            index.search(&[1.0], 1).await,
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn non_finite_vectors_are_rejected() {
        let index = Index::new(MemoryStore::new(), 2);
        index.upsert(vec![entry("keep.py", vec![1.0, 0.0])]).await.unwrap();

        let err = index
            .upsert(vec![
                entry("a.py", vec![f32::NAN, 0.0]),
                entry("b.py", vec![1.0, 0.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NonFiniteVector { position: 0, .. }));
        assert!(err.to_string().contains("chunk"));

        let err = index
            .upsert(vec![entry("c.py", vec![0.0, f32::INFINITY])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NonFiniteVector { position: 1, .. }));

        let results = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_path, "keep.py");
        assert!(results[0].score.is_finite());

        assert!(matches!(
            index.search(&[f32::NAN, 1.0], 5).await,
            Err(IndexError::NonFiniteVector { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_upsert_is_rejected() {
        let index = Arc::new(Index::new(
            SlowStore {
                inner: MemoryStore::new(),
                delay: Duration::from_millis(200),
            },
            1,
        ));
        let first = {
            let index = Arc::clone(&index);
            tokio::spawn(async move { index.upsert(vec![entry("a.py", vec![1.0])]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = index.upsert(vec![entry("b.py", vec![1.0])]).await;
        assert!(matches!(second, Err(IndexError::WriteInProgress)));
        first.await.unwrap().unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn search_respects_top_k_and_ordering(
            vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..40),
            query in prop::collection::vec(-1.0f32..1.0, 4),
            top_k in 0usize..12,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let results = rt.block_on(async {
                let index = Index::new(MemoryStore::new(), 4);
                let entries = vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| entry(&format!("f{i}.py"), v))
                    .collect();
                index.upsert(entries).await.unwrap();
                index.search(&query, top_k).await.unwrap()
            });
            prop_assert!(results.len() <= top_k);
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
