//! Batched, retried embedding of chunks and queries.

use std::sync::Arc;

use chrono::Utc;
use onboard_llm::LlmProvider;
use onboard_llm::retry::{RetryPolicy, with_retry};
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, EmbeddedChunk};
use crate::context::{CHARS_PER_TOKEN, contextualize_for_embedding, truncate_head};
use crate::error::VectorizeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Texts per provider call.
    pub batch_size: usize,
    /// Provider input limit; longer texts are cut head-first.
    pub max_input_tokens: usize,
    /// Expected vector length for the configured model.
    pub dimension: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_input_tokens: 8191,
            dimension: 1536,
        }
    }
}

/// Stateless wrapper turning texts into fixed-length vectors.
pub struct Vectorizer<P> {
    provider: Arc<P>,
    config: VectorizerConfig,
    retry: RetryPolicy,
}

impl<P: LlmProvider> Vectorizer<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: VectorizerConfig, retry: RetryPolicy) -> Self {
        Self {
            provider,
            config,
            retry,
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Model identifier recorded on stored vectors.
    #[must_use]
    pub fn model(&self) -> &str {
        self.provider
            .embedding_model()
            .unwrap_or_else(|| self.provider.name())
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_input_tokens.saturating_mul(CHARS_PER_TOKEN)
    }

    /// Embed `texts` in order, one vector per text.
    ///
    /// # Errors
    ///
    /// Returns [`VectorizeError::Batch`] naming the first batch that failed
    /// after retries, or a count/dimension mismatch.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorizeError> {
        if !self.provider.supports_embeddings() {
            return Err(VectorizeError::Unsupported(self.provider.name().to_owned()));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch, group) in texts.chunks(self.config.batch_size.max(1)).enumerate() {
            tracing::debug!(batch, size = group.len(), "embedding batch");
            let embedded = with_retry("embed_batch", &self.retry, || {
                self.provider.embed_batch(group)
            })
            .await
            .map_err(|exhausted| VectorizeError::Batch {
                batch,
                size: group.len(),
                attempts: exhausted.attempts,
                source: exhausted.error,
            })?;

            if embedded.len() != group.len() {
                return Err(VectorizeError::CountMismatch {
                    expected: group.len(),
                    actual: embedded.len(),
                });
            }
            if let Some(bad) = embedded.iter().find(|v| v.len() != self.config.dimension) {
                return Err(VectorizeError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: bad.len(),
                });
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Embed a free-text query as-is (head-truncated to the input limit).
    ///
    /// # Errors
    ///
    /// See [`Vectorizer::embed`].
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, VectorizeError> {
        let text = truncate_head(query, self.max_input_chars()).unwrap_or(query);
        let mut vectors = self.embed(&[text.to_owned()]).await?;
        vectors.pop().ok_or(VectorizeError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Embed chunks with their contextual header. Truncation is recorded in
    /// the chunk metadata as `truncated` and `embedded_chars`.
    ///
    /// # Errors
    ///
    /// See [`Vectorizer::embed`].
    pub async fn embed_chunks(
        &self,
        mut chunks: Vec<Chunk>,
    ) -> Result<Vec<EmbeddedChunk>, VectorizeError> {
        let max_chars = self.max_input_chars();
        let texts: Vec<String> = chunks
            .iter_mut()
            .map(|chunk| {
                let text = contextualize_for_embedding(chunk);
                match truncate_head(&text, max_chars) {
                    Some(head) => {
                        tracing::debug!(chunk = %chunk.id, file = %chunk.file_path, "truncating embedding input");
                        chunk
                            .metadata
                            .insert("truncated".to_owned(), "true".to_owned());
                        chunk
                            .metadata
                            .insert("embedded_chars".to_owned(), max_chars.to_string());
                        head.to_owned()
                    }
                    None => text,
                }
            })
            .collect();

        let vectors = self.embed(&texts).await?;
        let model = self.model().to_owned();
        let created_at = Utc::now();
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                chunk,
                vector,
                model: model.clone(),
                created_at,
            })
            .collect())
    }

    /// Embed a fixed sample text and check the returned dimension.
    ///
    /// # Errors
    ///
    /// Returns [`VectorizeError::DimensionMismatch`] when the provider's
    /// vectors do not match the configured dimension.
    pub async fn check_dimension(&self) -> Result<usize, VectorizeError> {
        let vectors = self.embed(&["dimension check".to_owned()]).await?;
        Ok(vectors.first().map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use onboard_llm::mock::{MockProvider, hashed_embedding};

    use super::*;
    use crate::chunk::SourceFile;
    use crate::segmenter::Segmenter;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            call_timeout: Duration::from_secs(5),
        }
    }

    fn vectorizer(mock: MockProvider, batch_size: usize) -> Vectorizer<MockProvider> {
        let config = VectorizerConfig {
            batch_size,
            max_input_tokens: 8191,
            dimension: mock.dimension,
        };
        Vectorizer::new(Arc::new(mock), config, fast_retry(3))
    }

    #[tokio::test]
    async fn embeds_in_batches_preserving_order() {
        let mock = MockProvider::default();
        let v = vectorizer(mock.clone(), 100);
        let texts: Vec<String> = (0..250).map(|i| format!("text number {i}")).collect();
        let vectors = v.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 250);
        assert_eq!(mock.embed_calls(), 3);
        assert_eq!(vectors[137], hashed_embedding("text number 137", mock.dimension));
    }

    #[tokio::test]
    async fn identical_chunks_get_identical_vectors() {
        let v = vectorizer(MockProvider::default(), 10);
        let file = SourceFile::new("a.py", "def f():\n    return 1\n");
        let first = Segmenter::default().segment(&file);
        let second = Segmenter::default().segment(&file);
        let a = v.embed_chunks(first).await.unwrap();
        let b = v.embed_chunks(second).await.unwrap();
        assert_eq!(a[0].vector, b[0].vector);
        assert_eq!(a[0].model, "mock-embedding");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let mock = MockProvider::default().with_transient_embed_failures(2);
        let v = vectorizer(mock.clone(), 100);
        let vectors = v.embed(&["x".to_owned()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(mock.embed_calls(), 3);
    }

    #[tokio::test]
    async fn exhaustion_names_the_failing_batch() {
        let mock = MockProvider::default().with_transient_embed_failures(100);
        let v = Vectorizer::new(
            Arc::new(mock.clone()),
            VectorizerConfig {
                batch_size: 2,
                max_input_tokens: 100,
                dimension: mock.dimension,
            },
            fast_retry(1),
        );
        let texts: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let err = v.embed(&texts).await.unwrap_err();
        assert!(err.is_transient());
        match err {
            VectorizeError::Batch {
                batch,
                size,
                attempts,
                ..
            } => {
                assert_eq!(batch, 0);
                assert_eq!(size, 2);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.embed_calls(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let mock = MockProvider::default().with_failing_embeddings();
        let v = vectorizer(mock.clone(), 100);
        let err = v.embed(&["x".to_owned()]).await.unwrap_err();
        assert!(matches!(err, VectorizeError::Batch { attempts: 1, .. }));
        assert_eq!(mock.embed_calls(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_configuration_error() {
        let mock = MockProvider::default().with_dimension(8);
        let v = Vectorizer::new(
            Arc::new(mock),
            VectorizerConfig {
                dimension: 16,
                ..VectorizerConfig::default()
            },
            fast_retry(0),
        );
        let err = v.check_dimension().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            VectorizeError::DimensionMismatch {
                expected: 16,
                actual: 8
            }
        ));
    }

    #[tokio::test]
    async fn long_chunks_are_truncated_and_tagged() {
        let mock = MockProvider::default();
        let v = Vectorizer::new(
            Arc::new(mock.clone()),
            VectorizerConfig {
                batch_size: 10,
                max_input_tokens: 10,
                dimension: mock.dimension,
            },
            fast_retry(0),
        );
        let text = format!("x = \"{}\"\n", "y".repeat(400));
        let chunks = Segmenter::default().segment(&SourceFile::new("long.txt", text));
        let embedded = v.embed_chunks(chunks).await.unwrap();
        let meta = &embedded[0].chunk.metadata;
        assert_eq!(meta.get("truncated").map(String::as_str), Some("true"));
        assert_eq!(meta.get("embedded_chars").map(String::as_str), Some("40"));
    }

    #[tokio::test]
    async fn provider_without_embeddings_is_unsupported() {
        let mock = MockProvider::default().without_embeddings();
        let v = vectorizer(mock, 10);
        let err = v.embed_query("where is main").await.unwrap_err();
        assert!(matches!(err, VectorizeError::Unsupported(_)));
    }
}
